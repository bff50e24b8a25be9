//! Binds a marketing template to listing data.
//!
//! The result is a [`RenderTarget`]: a flat list of positioned primitives that
//! can be turned into an SVG document for preview or capture. Binding performs
//! no I/O; photos are referenced by URL and inlined from the preloaded
//! [`ImageStore`] when the SVG is produced.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::RenderError;
use crate::models::{
    AppConfig, ElementRole, MarketingTemplate, MissingImagePolicy, OriginX, OriginY,
    PropertyMarketingData, Shadow, TemplateObject, TextAlign, TextObject,
};
use crate::rendering::substitute::substitute_str;
use crate::services::image_preloader::ImageStore;

const SCENE_TEMPLATE: &str = include_str!("scene.svg");
const SCENE_NAME: &str = "scene.svg";

/// Text boxes without an explicit width wrap here
pub const DEFAULT_TEXT_WIDTH: f32 = 600.0;

const LINE_HEIGHT: f32 = 1.16;
const ASCENT: f32 = 0.8;
const GLYPH_WIDTH: f32 = 0.55;
const BOLD_GLYPH_WIDTH: f32 = 0.6;
const DEFAULT_FONT_FAMILY: &str = "Arial";
const DEFAULT_FILL: &str = "#000000";

/// Fill of a placeholder block drawn for a slot without a photo
pub const PLACEHOLDER_FILL: &str = "#e5e7eb";

/// Options applied while binding
#[derive(Debug, Clone)]
pub struct BindOptions {
    /// Which photo is primary (the "swap image" action)
    pub image_offset: usize,
    pub missing_image: MissingImagePolicy,
    /// Only the first N photos are ever referenced
    pub max_images: usize,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            image_offset: 0,
            missing_image: MissingImagePolicy::default(),
            max_images: 3,
        }
    }
}

impl BindOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            image_offset: 0,
            missing_image: config.export.missing_image,
            max_images: config.preload.max_images,
        }
    }

    pub fn with_image_offset(mut self, offset: usize) -> Self {
        self.image_offset = offset;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rotation {
    pub angle: f32,
    pub cx: f32,
    pub cy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowFilter {
    pub id: String,
    pub color: String,
    pub std_deviation: f32,
    pub dx: f32,
    pub dy: f32,
}

/// Scale applied to the whole scene (only the preview uses one)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RootTransform {
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageElement {
    /// Index of the template slot this photo fills
    pub slot: usize,
    pub url: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub opacity: f32,
    pub rotate: Option<Rotation>,
    /// Inline data URI, only set while producing SVG
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RectElement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: String,
    pub opacity: f32,
    pub stroke: Option<String>,
    pub stroke_width: f32,
    pub shadow: Option<ShadowFilter>,
    pub rotate: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleElement {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    pub fill: String,
    pub opacity: f32,
    pub stroke: Option<String>,
    pub stroke_width: f32,
    pub shadow: Option<ShadowFilter>,
    pub rotate: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextElement {
    pub role: &'static str,
    /// Substituted text before wrapping
    pub text: String,
    pub lines: Vec<String>,
    /// Anchor x and the baseline of the first line
    pub x: f32,
    pub y: f32,
    pub line_height: f32,
    pub anchor: &'static str,
    pub font_family: String,
    pub font_size: f32,
    pub font_weight: String,
    pub fill: String,
    pub opacity: f32,
    pub stroke: Option<String>,
    pub stroke_width: f32,
    pub shadow: Option<ShadowFilter>,
    pub rotate: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Image(ImageElement),
    Rect(RectElement),
    Circle(CircleElement),
    Text(TextElement),
}

/// A template bound to one listing, ready to be previewed or captured
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub template_id: String,
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub elements: Vec<Element>,
    /// Transient preview scale; must be cleared before capture
    pub root_transform: Option<RootTransform>,
}

#[derive(Serialize)]
struct SceneContext<'a> {
    svg_width: u32,
    svg_height: u32,
    width: u32,
    height: u32,
    background: &'a str,
    root_scale: Option<f32>,
    elements: Vec<Element>,
}

impl RenderTarget {
    /// Distinct photo URLs in slot order
    pub fn image_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for element in &self.elements {
            if let Element::Image(img) = element {
                if !urls.contains(&img.url) {
                    urls.push(img.url.clone());
                }
            }
        }
        urls
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text(t) => Some(t),
            _ => None,
        })
    }

    /// Substituted text of the first element with the given role
    pub fn text_for(&self, role: ElementRole) -> Option<&str> {
        let name = role_name(role);
        self.texts()
            .find(|t| t.role == name)
            .map(|t| t.text.as_str())
    }

    /// Copy of this target scaled down to a `size` wide preview
    pub fn with_preview(&self, size: u32) -> Self {
        let mut preview = self.clone();
        preview.root_transform = (self.width > 0 && size > 0).then(|| RootTransform {
            scale: size as f32 / self.width as f32,
        });
        preview
    }

    /// Clear the root transform until the returned guard is dropped
    pub fn neutralize(&mut self) -> NeutralizedRoot<'_> {
        let saved = self.root_transform.take();
        NeutralizedRoot {
            target: self,
            saved,
        }
    }

    pub fn preview_svg(&self, size: u32, images: &ImageStore) -> Result<String, RenderError> {
        self.with_preview(size).to_svg(images)
    }

    /// Produce the SVG document for this target.
    ///
    /// Photos missing from `images` are left out. The document size follows
    /// the root transform, so a target that still carries the preview scale
    /// renders small.
    pub fn to_svg(&self, images: &ImageStore) -> Result<String, RenderError> {
        let scale = self.root_transform.map(|t| t.scale);
        let factor = scale.unwrap_or(1.0);

        let elements = self
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Image(img) => {
                    let href = images.data_uri(&img.url);
                    if href.is_none() {
                        tracing::debug!(url = %img.url, slot = img.slot, "Photo not preloaded, leaving gap");
                    }
                    href.map(|href| {
                        Element::Image(ImageElement {
                            href: Some(href),
                            ..img.clone()
                        })
                    })
                }
                other => Some(other.clone()),
            })
            .collect();

        let context = SceneContext {
            svg_width: (self.width as f32 * factor).round() as u32,
            svg_height: (self.height as f32 * factor).round() as u32,
            width: self.width,
            height: self.height,
            background: &self.background,
            root_scale: scale,
            elements,
        };

        let mut tera = Tera::default();
        tera.autoescape_on(vec![".svg"]);
        tera.add_raw_template(SCENE_NAME, SCENE_TEMPLATE)?;
        let svg = tera.render(SCENE_NAME, &Context::from_serialize(&context)?)?;
        Ok(svg)
    }
}

/// A render target with its root transform temporarily removed.
///
/// The transform is put back when the guard drops, whether or not the
/// capture using it succeeded.
pub struct NeutralizedRoot<'a> {
    target: &'a mut RenderTarget,
    saved: Option<RootTransform>,
}

impl std::ops::Deref for NeutralizedRoot<'_> {
    type Target = RenderTarget;

    fn deref(&self) -> &RenderTarget {
        self.target
    }
}

impl Drop for NeutralizedRoot<'_> {
    fn drop(&mut self) {
        self.target.root_transform = self.saved.take();
    }
}

/// Binds templates to listing data
#[derive(Debug, Clone)]
pub struct CanvasRenderer {
    brand: String,
}

impl CanvasRenderer {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
        }
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn bind(
        &self,
        template: &MarketingTemplate,
        data: &PropertyMarketingData,
        options: &BindOptions,
    ) -> RenderTarget {
        let values = data.substitution_map(&self.brand);
        let mut images = data.rotated_images(options.image_offset);
        images.truncate(options.max_images);

        let mut elements = Vec::with_capacity(template.objects.len());
        let mut slot = 0;

        for (index, object) in template.objects.iter().enumerate() {
            match object {
                TemplateObject::Image(img) => {
                    let rotate = img.angle.map(|angle| Rotation {
                        angle,
                        cx: img.left + img.width / 2.0,
                        cy: img.top + img.height / 2.0,
                    });
                    let opacity = img.opacity.unwrap_or(1.0);
                    let url = images
                        .get(slot)
                        .or_else(|| match options.missing_image {
                            MissingImagePolicy::RepeatPrimary => images.first(),
                            _ => None,
                        })
                        .cloned();

                    match (url, options.missing_image) {
                        (Some(url), _) => elements.push(Element::Image(ImageElement {
                            slot,
                            url,
                            x: img.left,
                            y: img.top,
                            width: img.width,
                            height: img.height,
                            opacity,
                            rotate,
                            href: None,
                        })),
                        (None, MissingImagePolicy::Hide) => {
                            tracing::debug!(slot, template = %template.id, "No photo for slot, hiding");
                        }
                        (None, _) => elements.push(Element::Rect(RectElement {
                            x: img.left,
                            y: img.top,
                            width: img.width,
                            height: img.height,
                            fill: PLACEHOLDER_FILL.to_string(),
                            opacity,
                            stroke: None,
                            stroke_width: 0.0,
                            shadow: None,
                            rotate,
                        })),
                    }
                    slot += 1;
                }
                TemplateObject::Rect(rect) => elements.push(Element::Rect(RectElement {
                    x: rect.left,
                    y: rect.top,
                    width: rect.width,
                    height: rect.height,
                    fill: rect.fill.clone().unwrap_or_else(|| DEFAULT_FILL.to_string()),
                    opacity: rect.opacity.unwrap_or(1.0),
                    stroke: rect.stroke.clone(),
                    stroke_width: rect.stroke_width.unwrap_or(1.0),
                    shadow: shadow_filter(index, rect.shadow.as_ref()),
                    rotate: rect.angle.map(|angle| Rotation {
                        angle,
                        cx: rect.left,
                        cy: rect.top,
                    }),
                })),
                TemplateObject::Circle(circle) => elements.push(Element::Circle(CircleElement {
                    cx: circle.left + circle.radius,
                    cy: circle.top + circle.radius,
                    r: circle.radius,
                    fill: circle
                        .fill
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FILL.to_string()),
                    opacity: circle.opacity.unwrap_or(1.0),
                    stroke: circle.stroke.clone(),
                    stroke_width: circle.stroke_width.unwrap_or(1.0),
                    shadow: shadow_filter(index, circle.shadow.as_ref()),
                    rotate: circle.angle.map(|angle| Rotation {
                        angle,
                        cx: circle.left,
                        cy: circle.top,
                    }),
                })),
                TemplateObject::Text(text) => {
                    let resolved = substitute_str(&text.text, &values);
                    elements.push(Element::Text(layout_text(index, text, resolved)));
                }
            }
        }

        tracing::debug!(
            template = %template.id,
            elements = elements.len(),
            photos = images.len(),
            "Bound template"
        );

        RenderTarget {
            template_id: template.id.clone(),
            width: template.canvas.width,
            height: template.canvas.height,
            background: template.canvas.background_color.clone(),
            elements,
            root_transform: None,
        }
    }
}

fn shadow_filter(index: usize, shadow: Option<&Shadow>) -> Option<ShadowFilter> {
    shadow.map(|s| ShadowFilter {
        id: format!("shadow-{index}"),
        color: s.color.clone(),
        std_deviation: s.blur / 2.0,
        dx: s.offset_x,
        dy: s.offset_y,
    })
}

fn role_name(role: ElementRole) -> &'static str {
    match role {
        ElementRole::Price => "price",
        ElementRole::Title => "title",
        ElementRole::Address => "address",
        ElementRole::Contact => "contact",
        ElementRole::Watermark => "watermark",
        ElementRole::Logo => "logo",
        ElementRole::Other => "other",
    }
}

fn is_bold(weight: &str) -> bool {
    match weight {
        "bold" | "bolder" => true,
        w => w.parse::<u16>().map(|n| n >= 600).unwrap_or(false),
    }
}

fn layout_text(index: usize, text: &TextObject, resolved: String) -> TextElement {
    let box_width = text.width.unwrap_or(DEFAULT_TEXT_WIDTH);
    let font_weight = text
        .font_weight
        .clone()
        .unwrap_or_else(|| "normal".to_string());
    let glyph = if is_bold(&font_weight) {
        BOLD_GLYPH_WIDTH
    } else {
        GLYPH_WIDTH
    };
    let lines = wrap_text(&resolved, box_width, text.font_size * glyph);
    let line_height = text.font_size * LINE_HEIGHT;

    // Unaligned text follows its horizontal origin
    let align = text.text_align.unwrap_or(match text.origin_x {
        OriginX::Left => TextAlign::Left,
        OriginX::Center => TextAlign::Center,
        OriginX::Right => TextAlign::Right,
    });
    let box_left = match text.origin_x {
        OriginX::Left => text.left,
        OriginX::Center => text.left - box_width / 2.0,
        OriginX::Right => text.left - box_width,
    };
    let (x, anchor) = match align {
        TextAlign::Left => (box_left, "start"),
        TextAlign::Center => (box_left + box_width / 2.0, "middle"),
        TextAlign::Right => (box_left + box_width, "end"),
    };

    let block_height = line_height * lines.len().max(1) as f32;
    let block_top = match text.origin_y {
        OriginY::Top => text.top,
        OriginY::Center => text.top - block_height / 2.0,
        OriginY::Bottom => text.top - block_height,
    };
    let y = block_top + text.font_size * ASCENT;

    TextElement {
        role: role_name(ElementRole::from_id(text.id.as_deref())),
        text: resolved,
        lines,
        x,
        y,
        line_height,
        anchor,
        font_family: text
            .font_family
            .clone()
            .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
        font_size: text.font_size,
        font_weight,
        fill: text.fill.clone().unwrap_or_else(|| DEFAULT_FILL.to_string()),
        opacity: text.opacity.unwrap_or(1.0),
        stroke: text.stroke.clone(),
        stroke_width: text.stroke_width.unwrap_or(1.0),
        shadow: shadow_filter(index, text.shadow.as_ref()),
        rotate: text.angle.map(|angle| Rotation {
            angle,
            cx: text.left,
            cy: text.top,
        }),
    }
}

/// Greedy word wrap using an average glyph advance.
///
/// Words longer than the box stay on a line of their own. Explicit newlines
/// always break.
pub fn wrap_text(text: &str, max_width: f32, glyph_width: f32) -> Vec<String> {
    let max_chars = if glyph_width > 0.0 {
        ((max_width / glyph_width).floor() as usize).max(1)
    } else {
        usize::MAX
    };

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_len == 0 {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_chars {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_len = word_len;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
