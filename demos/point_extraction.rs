use anyhow::Result;
use appeears::{Client, DateRange};
use std::path::Path;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure authentication via env vars or a `.appeearsrc` file.
    let client = Client::from_env()?.with_progress(true);

    let spec = client.submitter().point_spec(
        40.7128,
        -74.0060,
        "MOD11A1.061",
        &["LST_Day_1km", "QC_Day"],
        DateRange::parse("01-01-2023", "01-31-2023")?,
    )?;

    let files = client.retrieve(&spec, Path::new("appeears_output"))?;
    for path in &files {
        println!("{}", path.display());
    }

    client.logout()?;
    Ok(())
}
