use crate::assets::AssetLoader;
use crate::error::RenderError;
use crate::models::ExportFormat;
use resvg::usvg::{self, Transform};
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap};
use tokio::sync::OnceCell;

/// Captures are rendered at twice the canvas size
pub const PIXEL_RATIO: u32 = 2;

/// Largest pixel edge a capture may have
const MAX_EDGE: u32 = 8192;

/// Rasterizes render-target SVG documents into opaque bitmaps.
///
/// Owns the font database used for text; fonts are loaded once when the
/// rasterizer is built and shared across captures.
pub struct SvgRasterizer {
    fontdb: Arc<fontdb::Database>,
    background_fallback: Color,
}

impl SvgRasterizer {
    /// Create a rasterizer with fonts loaded from the provided data
    pub fn with_fonts(fonts: Vec<(String, std::borrow::Cow<'static, [u8]>)>) -> Self {
        let mut fontdb = fontdb::Database::new();

        for (name, data) in fonts {
            fontdb.load_font_data(data.into_owned());
            tracing::debug!(font = %name, "Loaded font");
        }

        // System fonts cover the families templates ask for (Arial, Georgia)
        fontdb.load_system_fonts();

        tracing::info!(
            font_count = fontdb.len(),
            "Loaded fonts for SVG text rendering"
        );

        Self {
            fontdb: Arc::new(fontdb),
            background_fallback: Color::WHITE,
        }
    }

    /// Create a rasterizer with system fonts only
    pub fn new() -> Self {
        Self::with_fonts(Vec::new())
    }

    /// Fill used when a template background is missing, unparsable or transparent
    pub fn with_background_fallback(mut self, color: &str) -> Self {
        match parse_color(color) {
            Some(c) if c.is_opaque() => self.background_fallback = c,
            _ => tracing::warn!(color, "Ignoring unusable background fallback"),
        }
        self
    }

    pub fn font_count(&self) -> usize {
        self.fontdb.len()
    }

    /// Rasterize an SVG document of `width`x`height` canvas units.
    ///
    /// The pixmap is `PIXEL_RATIO` times the canvas size and starts filled
    /// with an opaque background, so the output never carries transparency.
    pub fn rasterize(
        &self,
        svg: &str,
        width: u32,
        height: u32,
        background: &str,
    ) -> Result<Pixmap, RenderError> {
        let (px_width, px_height) = (width * PIXEL_RATIO, height * PIXEL_RATIO);
        if width == 0 || height == 0 || px_width > MAX_EDGE || px_height > MAX_EDGE {
            return Err(RenderError::UnsupportedDimensions { width, height });
        }

        let options = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &options)
            .map_err(|e| RenderError::SvgParse(e.to_string()))?;

        let mut pixmap = Pixmap::new(px_width, px_height).ok_or(RenderError::PixmapAllocation)?;
        pixmap.fill(self.resolve_background(background));

        let scale = PIXEL_RATIO as f32;
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        Ok(pixmap)
    }

    fn resolve_background(&self, background: &str) -> Color {
        match parse_color(background) {
            Some(c) if c.is_opaque() => c,
            _ => {
                tracing::debug!(background, "Using fallback background");
                self.background_fallback
            }
        }
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

/// A rasterizer whose font database is built on first use.
///
/// Loading fonts scans the system font directories, so it runs on the
/// blocking pool. Waiting on [`FontGate::ready`] is the "fonts are ready"
/// step before a capture.
pub struct FontGate {
    cell: OnceCell<Arc<SvgRasterizer>>,
    loader: AssetLoader,
    background_fallback: String,
}

impl FontGate {
    pub fn new(loader: AssetLoader, background_fallback: impl Into<String>) -> Self {
        Self {
            cell: OnceCell::new(),
            loader,
            background_fallback: background_fallback.into(),
        }
    }

    /// A gate that is already open
    pub fn loaded(rasterizer: SvgRasterizer) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(rasterizer))),
            loader: AssetLoader::new(None, None, None),
            background_fallback: String::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn ready(&self) -> Result<Arc<SvgRasterizer>, RenderError> {
        self.cell
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                let fallback = self.background_fallback.clone();
                tokio::task::spawn_blocking(move || {
                    Arc::new(
                        SvgRasterizer::with_fonts(loader.get_fonts())
                            .with_background_fallback(&fallback),
                    )
                })
                .await
                .map_err(|e| RenderError::SvgParse(format!("Font loading task failed: {e}")))
            })
            .await
            .cloned()
    }
}

/// Encode a captured pixmap. Empty output is an error.
pub fn encode(pixmap: &Pixmap, format: ExportFormat, quality: u8) -> Result<Vec<u8>, RenderError> {
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();

    let bytes = match format {
        ExportFormat::Jpeg => encode_jpeg(&rgb, pixmap.width(), pixmap.height(), quality)?,
        ExportFormat::Png => encode_png(&rgb, pixmap.width(), pixmap.height())?,
    };

    if bytes.is_empty() {
        return Err(RenderError::EmptyOutput);
    }
    Ok(bytes)
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::JpegEncode(e.to_string()))?;
    Ok(buf.into_inner())
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = png::Encoder::new(&mut buf, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Fast);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
        writer
            .write_image_data(rgb)
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
    }
    let png_bytes = buf.into_inner();

    // Re-compress; keep the fast encoding if oxipng fails
    let optimized = oxipng::optimize_from_memory(
        &png_bytes,
        &oxipng::Options {
            strip: oxipng::StripChunks::Safe,
            ..oxipng::Options::from_preset(1)
        },
    )
    .unwrap_or(png_bytes);
    Ok(optimized)
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`/`rgba()` and a few names
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        let digits = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut c = hex.chars().map(|ch| ch.to_digit(16).map(|d| (d * 17) as u8));
                Some(Color::from_rgba8(c.next()??, c.next()??, c.next()??, 255))
            }
            6 => Some(Color::from_rgba8(
                digits(hex.get(0..2)?)?,
                digits(hex.get(2..4)?)?,
                digits(hex.get(4..6)?)?,
                255,
            )),
            8 => Some(Color::from_rgba8(
                digits(hex.get(0..2)?)?,
                digits(hex.get(2..4)?)?,
                digits(hex.get(4..6)?)?,
                digits(hex.get(6..8)?)?,
            )),
            _ => None,
        };
    }

    let lower = value.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|s| s.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
        return match parts.as_slice() {
            [r, g, b] => Some(Color::from_rgba8(channel(r)?, channel(g)?, channel(b)?, 255)),
            [r, g, b, a] => {
                let alpha = a.parse::<f32>().ok()?.clamp(0.0, 1.0);
                Some(Color::from_rgba8(
                    channel(r)?,
                    channel(g)?,
                    channel(b)?,
                    (alpha * 255.0).round() as u8,
                ))
            }
            _ => None,
        };
    }

    match lower.as_str() {
        "white" => Some(Color::WHITE),
        "black" => Some(Color::BLACK),
        "transparent" => Some(Color::TRANSPARENT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50" viewBox="0 0 100 50">
  <rect x="0" y="0" width="50" height="50" fill="#ff0000"/>
</svg>"##;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = pixmap.pixel(x, y).unwrap();
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn test_rasterize_at_pixel_ratio() {
        let rasterizer = SvgRasterizer::with_fonts(Vec::new());
        let pixmap = rasterizer.rasterize(SQUARE, 100, 50, "#0000ff").unwrap();

        assert_eq!(pixmap.width(), 200);
        assert_eq!(pixmap.height(), 100);
        assert_eq!(pixel(&pixmap, 10, 10), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 150, 50), (0, 0, 255, 255));
    }

    #[test]
    fn test_transparent_background_uses_fallback() {
        let rasterizer = SvgRasterizer::with_fonts(Vec::new()).with_background_fallback("#00ff00");
        let pixmap = rasterizer.rasterize(SQUARE, 100, 50, "transparent").unwrap();
        assert_eq!(pixel(&pixmap, 150, 50), (0, 255, 0, 255));

        let pixmap = rasterizer.rasterize(SQUARE, 100, 50, "not-a-color").unwrap();
        assert_eq!(pixel(&pixmap, 150, 50), (0, 255, 0, 255));
    }

    #[test]
    fn test_rejects_bad_input() {
        let rasterizer = SvgRasterizer::with_fonts(Vec::new());
        assert!(matches!(
            rasterizer.rasterize(SQUARE, 0, 50, "#fff"),
            Err(RenderError::UnsupportedDimensions { .. })
        ));
        assert!(matches!(
            rasterizer.rasterize("<svg", 10, 10, "#fff"),
            Err(RenderError::SvgParse(_))
        ));
    }

    #[test]
    fn test_encode_formats() {
        let rasterizer = SvgRasterizer::with_fonts(Vec::new());
        let pixmap = rasterizer.rasterize(SQUARE, 100, 50, "#ffffff").unwrap();

        let jpeg = encode(&pixmap, ExportFormat::Jpeg, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let png = encode(&pixmap, ExportFormat::Png, 90).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[tokio::test]
    async fn test_font_gate_opens_once() {
        let gate = FontGate::loaded(SvgRasterizer::with_fonts(Vec::new()));
        assert!(gate.is_ready());
        let a = gate.ready().await.unwrap();
        let b = gate.ready().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#fff"), Some(Color::WHITE));
        assert_eq!(parse_color("#2D5F3F"), Some(Color::from_rgba8(0x2D, 0x5F, 0x3F, 255)));
        assert_eq!(
            parse_color("rgba(0, 0, 0, 0.5)"),
            Some(Color::from_rgba8(0, 0, 0, 128))
        );
        assert_eq!(parse_color("rgb(255,255,255)"), Some(Color::WHITE));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("hsl(0, 0%, 0%)"), None);
    }
}
