use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::rendering::price::{format_price, parse_price};

/// The fields of a property listing needed to render a marketing post.
///
/// Derived once per render request from the listing fetched from the
/// property API; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PropertyMarketingData {
    pub title: String,
    /// Total price in rupees, `None` when the listing has no usable price
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub contact: String,
    /// Absolute image URLs, primary photo first
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carpet_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}

impl PropertyMarketingData {
    /// Project a property JSON document from the backend.
    ///
    /// Accepts the alternate field names different listing sources use.
    /// Images may be plain URLs or `{image, is_thumbnail}` objects; the
    /// thumbnail-flagged image becomes the primary photo. Relative image
    /// paths are resolved against `base_url`.
    pub fn from_property(property: &Value, base_url: Option<&str>) -> Self {
        let title = first_string(property, &["title", "property_name", "project_name"]);
        let price = first_number(property, &["total_price", "price", "expected_price"]);
        let locality = first_string(property, &["locality", "area"]);
        let city = first_string(property, &["city"]);
        let contact = first_string(
            property,
            &[
                "contact_number",
                "whatsapp_number",
                "owner_phone",
                "phone",
                "mobile_number",
                "contact",
            ],
        );
        let bedrooms = first_number(property, &["bhk_config", "bedrooms", "bhk_type"])
            .filter(|b| *b >= 0.0)
            .map(|b| b as u32);
        let carpet_area = first_number(
            property,
            &["carpet_area", "area_sqft", "super_builtup_area", "built_up_area"],
        );
        let property_type = Some(first_string(property, &["property_type"])).filter(|s| !s.is_empty());

        Self {
            title,
            price,
            locality,
            city,
            contact,
            images: extract_images(property, base_url),
            bedrooms,
            carpet_area,
            property_type,
        }
    }

    /// "locality, city" with either half optional
    pub fn address(&self) -> String {
        [self.locality.trim(), self.city.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn formatted_price(&self) -> String {
        format_price(self.price)
    }

    /// Values for every placeholder a template may use
    pub fn substitution_map(&self, brand: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("title".to_string(), self.title.clone());
        map.insert("price".to_string(), self.formatted_price());
        map.insert("address".to_string(), self.address());
        map.insert("locality".to_string(), self.locality.clone());
        map.insert("city".to_string(), self.city.clone());
        map.insert("contact".to_string(), self.contact.clone());
        map.insert("brand".to_string(), brand.to_string());
        if let Some(bedrooms) = self.bedrooms {
            map.insert("bedrooms".to_string(), format!("{bedrooms} BHK"));
        }
        if let Some(area) = self.carpet_area {
            map.insert("carpet_area".to_string(), format!("{} sq.ft", area.round()));
        }
        if let Some(ref kind) = self.property_type {
            map.insert("property_type".to_string(), kind.replace('_', " "));
        }
        map
    }

    /// Images with the primary photo moved to `offset` (the "swap image" action)
    pub fn rotated_images(&self, offset: usize) -> Vec<String> {
        if self.images.is_empty() {
            return Vec::new();
        }
        let start = offset % self.images.len();
        let mut images = self.images[start..].to_vec();
        images.extend_from_slice(&self.images[..start]);
        images
    }
}

fn first_string(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn first_number(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_price(s),
            _ => None,
        })
}

fn extract_images(property: &Value, base_url: Option<&str>) -> Vec<String> {
    let Some(entries) = property.get("images").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut thumbnail = None;
    let mut images = Vec::new();
    for entry in entries {
        let (url, is_thumbnail) = match entry {
            Value::String(s) => (s.as_str(), false),
            Value::Object(obj) => match obj.get("image").and_then(Value::as_str) {
                Some(s) => (
                    s,
                    obj.get("is_thumbnail")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                ),
                None => continue,
            },
            _ => continue,
        };
        let url = url.trim();
        if url.is_empty() {
            continue;
        }
        let resolved = resolve_url(url, base_url);
        if is_thumbnail && thumbnail.is_none() {
            thumbnail = Some(resolved);
        } else {
            images.push(resolved);
        }
    }

    if let Some(thumb) = thumbnail {
        images.insert(0, thumb);
    }
    images
}

/// Resolve a possibly relative media path against the API base URL
fn resolve_url(url: &str, base_url: Option<&str>) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
        return url.to_string();
    }
    match base_url.and_then(|b| reqwest::Url::parse(b).ok()) {
        Some(base) => base
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
        None => url.to_string(),
    }
}
