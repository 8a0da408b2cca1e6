use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::transport::DEFAULT_BASE_URL;

#[derive(Clone)]
pub struct ClientConfig {
    /// Base API URL, typically `https://appeears.earthdatacloud.nasa.gov/api`.
    pub url: String,
    /// Earthdata login.
    pub username: String,
    pub password: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("verify", &self.verify)
            .finish()
    }
}

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| std::env::var("APPEEARS_URL").ok());
    let mut username = username.or_else(|| std::env::var("APPEEARS_USER").ok());
    let mut password = password.or_else(|| std::env::var("APPEEARS_PASS").ok());

    let rc_candidates = rc_candidates();
    let mut file_verify: Option<bool> = None;

    if url.is_none() || username.is_none() || password.is_none() || verify.is_none() {
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                log::debug!("using configuration file {}", rc_path.display());

                url = url.or(cfg.url);
                username = username.or(cfg.username);
                password = password.or(cfg.password);
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let Some(username) = username else {
        bail!(
            "Missing configuration: username (set APPEEARS_USER or put `username:` in one of: {})",
            describe(&rc_candidates)
        );
    };
    let Some(password) = password else {
        bail!(
            "Missing configuration: password (set APPEEARS_PASS or put `password:` in one of: {})",
            describe(&rc_candidates)
        );
    };

    Ok(ClientConfig {
        url: url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        username,
        password,
        verify: verify.or(file_verify).unwrap_or(true),
    })
}

fn describe(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return ".appeearsrc".to_string();
    }
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // A key may be left empty with its value on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                assign(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                if matches!(k, "url" | "username" | "password") {
                    pending_key = Some(k);
                }
            } else {
                assign(&mut cfg, k, v);
            }
        }
    }

    cfg
}

fn assign(cfg: &mut RcConfig, key: &str, value: &str) {
    match key {
        "url" => cfg.url = Some(value.to_string()),
        "username" | "user" => cfg.username = Some(value.to_string()),
        "password" => cfg.password = Some(value.to_string()),
        "verify" => cfg.verify = Some(value != "0" && !value.eq_ignore_ascii_case("false")),
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) APPEEARS_RC (explicit)
    // 2) ./.appeearsrc
    // 3) ~/.appeearsrc
    if let Ok(p) = std::env::var("APPEEARS_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".appeearsrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".appeearsrc"));
    }
    v
}
