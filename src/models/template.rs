use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rendering::substitute::{TextTemplate, TokenError};

/// Placeholder names the renderer can fill from listing data
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "title",
    "price",
    "address",
    "locality",
    "city",
    "contact",
    "bedrooms",
    "carpet_area",
    "property_type",
    "brand",
];

/// A reusable visual layout for a marketing post.
///
/// Templates are defined at build time (embedded YAML) and never mutated at
/// runtime; they are looked up by id through the template registry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarketingTemplate {
    pub id: String,
    pub name: String,
    /// Position in the picker; ties are broken by id
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub style: TemplateStyle,
    pub canvas: CanvasSpec,
    pub objects: Vec<TemplateObject>,
}

/// Picker metadata for a template
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemplateStyle {
    pub accent: String,
    pub icon: String,
}

impl Default for TemplateStyle {
    fn default() -> Self {
        Self {
            accent: "#4B5563".to_string(),
            icon: "image".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background_color: String,
}

fn default_background() -> String {
    "#ffffff".to_string()
}

impl CanvasSpec {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A single visual primitive of a template
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateObject {
    Image(ImageObject),
    Text(TextObject),
    Rect(RectObject),
    Circle(CircleObject),
}

/// A photo slot, filled with listing images in declared order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageObject {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TextObject {
    pub left: f32,
    pub top: f32,
    /// Wrap width; text boxes default to 600px
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    /// Text content, may contain `{{placeholder}}` tokens
    pub text: String,
    pub font_size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
    #[serde(default)]
    pub origin_x: OriginX,
    #[serde(default)]
    pub origin_y: OriginY,
    /// Stable id marking substitutable elements (price, title, watermark, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RectObject {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CircleObject {
    pub left: f32,
    pub top: f32,
    pub radius: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Shadow {
    pub color: String,
    pub blur: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OriginX {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OriginY {
    #[default]
    Top,
    Center,
    Bottom,
}

/// What a text element stands for, derived from its stable id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Price,
    Title,
    Address,
    Contact,
    Watermark,
    Logo,
    Other,
}

impl ElementRole {
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            Some("price") => Self::Price,
            Some("title") => Self::Title,
            Some("address") => Self::Address,
            Some("contact") => Self::Contact,
            Some("watermark") => Self::Watermark,
            Some("logo") => Self::Logo,
            _ => Self::Other,
        }
    }
}

/// A template failed load-time validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("canvas {width}x{height} is empty")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("object {index}: {message}")]
    InvalidObject { index: usize, message: String },

    #[error("object {index}: {source}")]
    Token {
        index: usize,
        #[source]
        source: TokenError,
    },

    #[error("object {index}: unknown placeholder '{name}'")]
    UnknownPlaceholder { index: usize, name: String },
}

impl MarketingTemplate {
    /// Check geometry, opacities and placeholders of every object
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.canvas.is_empty() {
            return Err(ValidationError::EmptyCanvas {
                width: self.canvas.width,
                height: self.canvas.height,
            });
        }

        for (index, object) in self.objects.iter().enumerate() {
            let invalid = |message: &str| ValidationError::InvalidObject {
                index,
                message: message.to_string(),
            };

            if let Some(opacity) = object.opacity() {
                if !(0.0..=1.0).contains(&opacity) {
                    return Err(invalid("opacity must be within 0..=1"));
                }
            }

            match object {
                TemplateObject::Image(img) => {
                    if img.width <= 0.0 || img.height <= 0.0 {
                        return Err(invalid("image slot needs a positive width and height"));
                    }
                }
                TemplateObject::Rect(rect) => {
                    if rect.width <= 0.0 || rect.height <= 0.0 {
                        return Err(invalid("rect needs a positive width and height"));
                    }
                }
                TemplateObject::Circle(circle) => {
                    if circle.radius <= 0.0 {
                        return Err(invalid("circle needs a positive radius"));
                    }
                }
                TemplateObject::Text(text) => {
                    if text.text.trim().is_empty() {
                        return Err(invalid("text is empty"));
                    }
                    if text.font_size <= 0.0 {
                        return Err(invalid("font_size must be positive"));
                    }
                    if matches!(text.width, Some(w) if w <= 0.0) {
                        return Err(invalid("text width must be positive"));
                    }
                    let parsed = TextTemplate::parse(&text.text)
                        .map_err(|source| ValidationError::Token { index, source })?;
                    if let Some(name) = parsed
                        .tokens()
                        .find(|name| !KNOWN_PLACEHOLDERS.contains(name))
                    {
                        return Err(ValidationError::UnknownPlaceholder {
                            index,
                            name: name.to_string(),
                        });
                    };
                }
            }
        }

        Ok(())
    }

    /// Number of photo slots the template declares
    pub fn image_slot_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|o| matches!(o, TemplateObject::Image(_)))
            .count()
    }
}

impl TemplateObject {
    pub fn opacity(&self) -> Option<f32> {
        match self {
            Self::Image(o) => o.opacity,
            Self::Text(o) => o.opacity,
            Self::Rect(o) => o.opacity,
            Self::Circle(o) => o.opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(objects: &str) -> MarketingTemplate {
        let yaml = format!(
            "id: t\nname: T\ncanvas: {{ width: 1080, height: 1080 }}\nobjects:\n{objects}"
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_deserialize_tagged_objects() {
        let t = template(
            r##"  - { type: image, left: 0, top: 0, width: 1080, height: 700 }
  - { type: rect, left: 0, top: 700, width: 1080, height: 380, fill: "#2D5F3F" }
  - { type: circle, left: 10, top: 10, radius: 5 }
  - { type: text, text: "{{price}}", left: 60, top: 750, font_size: 72, origin_x: center, id: price }
"##,
        );
        assert_eq!(t.objects.len(), 4);
        assert_eq!(t.image_slot_count(), 1);
        assert_eq!(t.canvas.background_color, "#ffffff");
        match &t.objects[3] {
            TemplateObject::Text(text) => {
                assert_eq!(text.origin_x, OriginX::Center);
                assert_eq!(text.origin_y, OriginY::Top);
                assert_eq!(ElementRole::from_id(text.id.as_deref()), ElementRole::Price);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_placeholder() {
        let t = template("  - { type: text, text: \"{{owner_email}}\", left: 0, top: 0, font_size: 10 }\n");
        assert_eq!(
            t.validate(),
            Err(ValidationError::UnknownPlaceholder {
                index: 0,
                name: "owner_email".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let t = template("  - { type: image, left: 0, top: 0, width: 0, height: 10 }\n");
        assert!(matches!(
            t.validate(),
            Err(ValidationError::InvalidObject { index: 0, .. })
        ));

        let t = template("  - { type: circle, left: 0, top: 0, radius: -1 }\n");
        assert!(t.validate().is_err());

        let t = template("  - { type: rect, left: 0, top: 0, width: 5, height: 5, opacity: 1.5 }\n");
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_canvas() {
        let mut t = template("  - { type: rect, left: 0, top: 0, width: 5, height: 5 }\n");
        t.canvas.width = 0;
        assert!(matches!(t.validate(), Err(ValidationError::EmptyCanvas { .. })));
    }

    #[test]
    fn test_unknown_object_type_fails_to_parse() {
        let yaml = "id: t\nname: T\ncanvas: { width: 10, height: 10 }\nobjects:\n  - { type: video, left: 0, top: 0 }\n";
        assert!(serde_yaml::from_str::<MarketingTemplate>(yaml).is_err());
    }
}
