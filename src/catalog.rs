//! Products and the bands (layers) they provide.
//!
//! The catalog is a fixed lookup table used to reject bad requests before
//! they reach the network. [`Catalog::builtin`] covers the commonly used
//! MODIS/VIIRS products; [`Catalog::from_json`] loads a custom table.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{Error, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct Band {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Product {
    #[serde(rename = "product")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub bands: Vec<Band>,
}

impl Product {
    fn from_static(id: &str, description: &str, bands: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            bands: bands
                .iter()
                .map(|name| Band {
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
}

static BUILTIN: LazyLock<Catalog> = LazyLock::new(|| {
    Catalog::from_products([
        Product::from_static(
            "MOD11A1.061",
            "Land Surface Temperature & Emissivity (LST&E), Terra MODIS, daily 1000 m",
            &[
                "LST_Day_1km",
                "QC_Day",
                "Day_view_time",
                "Day_view_angl",
                "LST_Night_1km",
                "QC_Night",
                "Night_view_time",
                "Night_view_angl",
                "Emis_31",
                "Emis_32",
                "Clear_day_cov",
                "Clear_night_cov",
            ],
        ),
        Product::from_static(
            "MYD11A1.061",
            "Land Surface Temperature & Emissivity (LST&E), Aqua MODIS, daily 1000 m",
            &[
                "LST_Day_1km",
                "QC_Day",
                "Day_view_time",
                "Day_view_angl",
                "LST_Night_1km",
                "QC_Night",
                "Night_view_time",
                "Night_view_angl",
                "Emis_31",
                "Emis_32",
                "Clear_day_cov",
                "Clear_night_cov",
            ],
        ),
        Product::from_static(
            "MYD09A1.061",
            "Surface Reflectance Bands 1-7, Aqua MODIS, 8-day 500 m",
            &[
                "sur_refl_b01",
                "sur_refl_b02",
                "sur_refl_b03",
                "sur_refl_b04",
                "sur_refl_b05",
                "sur_refl_b06",
                "sur_refl_b07",
                "sur_refl_qc_500m",
                "sur_refl_szen",
                "sur_refl_vzen",
                "sur_refl_raz",
                "sur_refl_state_500m",
                "sur_refl_day_of_year",
            ],
        ),
        Product::from_static(
            "MOD13Q1.061",
            "Vegetation Indices (NDVI & EVI), Terra MODIS, 16-day 250 m",
            &[
                "_250m_16_days_NDVI",
                "_250m_16_days_EVI",
                "_250m_16_days_VI_Quality",
                "_250m_16_days_red_reflectance",
                "_250m_16_days_NIR_reflectance",
                "_250m_16_days_blue_reflectance",
                "_250m_16_days_MIR_reflectance",
                "_250m_16_days_view_zenith_angle",
                "_250m_16_days_sun_zenith_angle",
                "_250m_16_days_relative_azimuth_angle",
                "_250m_16_days_composite_day_of_the_year",
                "_250m_16_days_pixel_reliability",
            ],
        ),
        Product::from_static(
            "VNP21A1D.002",
            "Land Surface Temperature & Emissivity, day, S-NPP VIIRS, daily 1000 m",
            &[
                "LST_1KM",
                "QC",
                "Emis_14",
                "Emis_15",
                "Emis_16",
                "View_Angle",
                "View_Time",
            ],
        ),
    ])
});

impl Catalog {
    /// The compiled-in product table.
    pub fn builtin() -> &'static Catalog {
        &BUILTIN
    }

    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Loads a table shaped like
    /// `[{"product": "MOD11A1.061", "description": "...", "bands": ["LST_Day_1km"]}]`.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let products: Vec<Product> =
            serde_json::from_str(text).map_err(|source| Error::InvalidResponse {
                context: "parsing product catalog".to_string(),
                source,
            })?;
        Ok(Self::from_products(products))
    }

    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    pub fn resolve(&self, product_id: &str) -> Result<&Product, ValidationError> {
        self.get(product_id)
            .ok_or_else(|| ValidationError::UnknownProduct(product_id.to_string()))
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Keeps the requested names the product actually declares, in the
    /// product's order. Unknown names are dropped; if nothing is left the
    /// request is rejected.
    pub fn validate_bands<'p, S: AsRef<str>>(
        product: &'p Product,
        band_names: &[S],
    ) -> Result<Vec<&'p Band>, ValidationError> {
        let valid: Vec<&Band> = product
            .bands
            .iter()
            .filter(|b| band_names.iter().any(|n| n.as_ref() == b.name))
            .collect();

        if valid.is_empty() {
            return Err(ValidationError::NoValidBands {
                product: product.id.clone(),
                requested: band_names.iter().map(|n| n.as_ref().to_string()).collect(),
            });
        }

        let dropped: Vec<&str> = band_names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| product.band(n).is_none())
            .collect();
        if !dropped.is_empty() {
            log::warn!("ignoring unknown bands for {}: {:?}", product.id, dropped);
        }

        Ok(valid)
    }
}
