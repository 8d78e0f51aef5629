//! Product catalog: the read-only pricing oracle.
//!
//! A `{cities, products}` JSON document. Payment handlers re-derive every
//! charge amount from here at confirmation time; a client-supplied amount
//! is never trusted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub city_id: String,
    /// "mini" (free teaser) or "full"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price_stars: i64,
    #[serde(default)]
    pub price_rub: i64,
    #[serde(default)]
    pub price_usdt: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Path to the deliverable .kmz; defaults to assets/{id}.kmz
    #[serde(default)]
    pub file: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Product {
    /// Display title: "Батуми — Полный путеводитель" style when the city
    /// is known, bare title otherwise.
    pub fn display_title(&self, catalog: &Catalog) -> String {
        let title = self.title.clone().unwrap_or_else(|| self.id.clone());
        match catalog.city(&self.city_id) {
            Some(city) => format!("{} — {}", city.name, title),
            None => title,
        }
    }

    /// Path of the deliverable file for this product.
    pub fn file_path(&self) -> String {
        self.file
            .clone()
            .unwrap_or_else(|| format!("assets/{}.kmz", self.id))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogDoc {
    #[serde(default)]
    cities: Vec<City>,
    #[serde(default)]
    products: Vec<Product>,
}

/// Loaded catalog with id lookup maps.
#[derive(Debug, Clone)]
pub struct Catalog {
    cities: HashMap<String, City>,
    products: HashMap<String, Product>,
}

impl Catalog {
    /// Load the catalog from a JSON file.
    pub fn load(path: &str) -> AppResult<Self> {
        let raw = fs_err::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from a JSON string (used in tests).
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let doc: CatalogDoc = serde_json::from_str(raw)?;
        Ok(Self {
            cities: doc.cities.into_iter().map(|c| (c.id.clone(), c)).collect(),
            products: doc.products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        })
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn city(&self, id: &str) -> Option<&City> {
        self.cities.get(id)
    }

    /// An active product or a validation error. Never exposes whether the
    /// id exists but is inactive vs. unknown.
    fn active_product(&self, id: &str) -> AppResult<&Product> {
        match self.products.get(id) {
            Some(p) if p.active => Ok(p),
            _ => Err(AppError::Validation(format!("unknown product: {}", id))),
        }
    }

    /// Charge amount in Telegram Stars. Fails closed on unknown, inactive
    /// or non-positively priced products.
    pub fn charge_stars(&self, id: &str) -> AppResult<u32> {
        let product = self.active_product(id)?;
        if product.price_stars <= 0 {
            return Err(AppError::Validation(format!("product {} has no Stars price", id)));
        }
        u32::try_from(product.price_stars)
            .map_err(|_| AppError::Validation(format!("product {} has no Stars price", id)))
    }

    /// Charge amount in rubles (card rail). Same fail-closed semantics.
    pub fn charge_rub(&self, id: &str) -> AppResult<i64> {
        let product = self.active_product(id)?;
        if product.price_rub <= 0 {
            return Err(AppError::Validation(format!("product {} has no card price", id)));
        }
        Ok(product.price_rub)
    }

    /// Charge amount in USDT (manual rail). Same fail-closed semantics.
    pub fn charge_usdt(&self, id: &str) -> AppResult<f64> {
        let product = self.active_product(id)?;
        if product.price_usdt <= 0.0 {
            return Err(AppError::Validation(format!("product {} has no USDT price", id)));
        }
        Ok(product.price_usdt)
    }

    /// The free mini product for a city, if any.
    pub fn mini_product(&self, city_id: &str) -> Option<&Product> {
        self.products
            .values()
            .find(|p| p.active && p.kind == "mini" && p.city_id == city_id)
    }

    /// All active products, unordered.
    pub fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.values().filter(|p| p.active)
    }
}
