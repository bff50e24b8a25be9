//! Test fixtures and constants.

use marketkit::models::{AppConfig, PropertyMarketingData};
use tiny_skia::{Color, Pixmap};

/// A small solid-color PNG
pub fn png_bytes(r: u8, g: u8, b: u8) -> Vec<u8> {
    let mut pixmap = Pixmap::new(8, 8).expect("pixmap");
    pixmap.fill(Color::from_rgba8(r, g, b, 255));
    pixmap.encode_png().expect("encode png")
}

/// Listing data with the given photo URLs
pub fn listing(images: Vec<String>) -> PropertyMarketingData {
    PropertyMarketingData {
        title: "Sunny 2BHK in Baner".to_string(),
        price: Some(7_500_000.0),
        locality: "Baner".to_string(),
        city: "Pune".to_string(),
        contact: "+91 98765 43210".to_string(),
        images,
        bedrooms: Some(2),
        ..Default::default()
    }
}

/// Config tuned for tests: quick timeouts, no settle delay, files under `output_dir`
pub fn fast_config(output_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.brand = "ACME".to_string();
    config.preload.timeout_ms = 500;
    config.preload.deadline_ms = 2_000;
    config.export.settle_delay_ms = 0;
    config.export.output_dir = output_dir.to_path_buf();
    config
}

/// A backend property document as served by the property API
pub fn property_json(id: u64, owner: u64, image_base: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": "Sea View Villa",
        "total_price": 25_000_000,
        "locality": "Juhu",
        "city": "Mumbai",
        "contact_number": "+91 90000 00000",
        "bhk_config": 4,
        "owner": { "id": owner, "username": "seller" },
        "images": [
            { "image": format!("{image_base}/photos/pool.png"), "is_thumbnail": false },
            { "image": "/media/front.png", "is_thumbnail": true }
        ]
    })
}
