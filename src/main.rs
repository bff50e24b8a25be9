use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use marketkit::api;
use marketkit::assets::{AssetCategory, AssetLoader};
use marketkit::models::{AppConfig, ExportFormat, ExportOutcome, OutputAction, PropertyMarketingData};
use marketkit::server;
use marketkit::services::{MarketingService, PropertyClient, Session, TemplateRegistry};

#[derive(Parser)]
#[command(name = "marketkit")]
#[command(about = "Marketkit - marketing images for property listings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Render a marketing image for a listing
    Render {
        /// Property id to fetch from the property API (requires a session)
        #[arg(short, long, conflicts_with = "data")]
        property: Option<String>,

        /// JSON file with listing data instead of fetching it
        #[arg(short, long, required_unless_present = "property")]
        data: Option<PathBuf>,

        /// Template id (defaults to the last one used for this property)
        #[arg(short, long)]
        template: Option<String>,

        /// Directory to save the image in (defaults to export.output_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output format: "jpeg" or "png"
        #[arg(short, long)]
        format: Option<String>,

        /// Share instead of downloading (falls back to a download when unsupported)
        #[arg(long)]
        share: bool,

        /// Rotate the listing photos so that image N is the primary one
        #[arg(long, default_value_t = 0)]
        image_offset: usize,

        /// Also write the scaled SVG preview to this file
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// List the available templates
    Templates,
    /// Extract embedded assets to filesystem for customization
    Init {
        /// Extract template files
        #[arg(long)]
        templates: bool,

        /// Extract config.yaml
        #[arg(long)]
        config: bool,

        /// Extract all assets
        #[arg(long)]
        all: bool,

        /// Overwrite existing files
        #[arg(long, short)]
        force: bool,

        /// List embedded assets without extracting
        #[arg(long)]
        list: bool,
    },
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketkit API",
        description = "Template-driven marketing images for property listings",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(
        api::handle_list_templates,
        api::handle_get_template,
        api::handle_render,
        api::handle_preview,
    ),
    components(schemas(
        api::ErrorResponse,
        api::RenderRequest,
        marketkit::services::TemplateSummary,
        marketkit::models::MarketingTemplate,
        marketkit::models::PropertyMarketingData,
        marketkit::models::ExportFormat,
    )),
    tags(
        (name = "Templates", description = "Template catalog"),
        (name = "Render", description = "Image and preview rendering")
    )
)]
struct ApiDoc;

struct RenderArgs {
    property: Option<String>,
    data: Option<PathBuf>,
    template: Option<String>,
    output_dir: Option<PathBuf>,
    format: Option<String>,
    share: bool,
    image_offset: usize,
    preview: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render {
            property,
            data,
            template,
            output_dir,
            format,
            share,
            image_offset,
            preview,
        }) => {
            run_render_command(RenderArgs {
                property,
                data,
                template,
                output_dir,
                format,
                share,
                image_offset,
                preview,
            })
            .await
        }
        Some(Commands::Templates) => run_templates_command(),
        Some(Commands::Init {
            templates,
            config,
            all,
            force,
            list,
        }) => run_init_command(templates, config, all, force, list),
        Some(Commands::Serve) => run_server().await,
        None => {
            run_status_command();
            Ok(())
        }
    }
}

fn init_cli_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketkit=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

/// Render one listing to a file (no server needed)
async fn run_render_command(args: RenderArgs) -> anyhow::Result<()> {
    init_cli_logging();

    let asset_loader = AssetLoader::from_env();
    if let Err(e) = asset_loader.seed_if_configured() {
        tracing::warn!(%e, "Failed to seed assets");
    }

    let mut config = AppConfig::load_from_assets(&asset_loader);
    let format = match args.format.as_deref() {
        Some(name) => Some(
            ExportFormat::from_str(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown format '{name}', use jpeg or png"))?,
        ),
        None => None,
    };

    // Listing data: from a file, or fetched for the signed-in owner
    let (property_key, data) = match (&args.property, &args.data) {
        (_, Some(path)) => {
            let content = std::fs::read_to_string(path)?;
            let data: PropertyMarketingData = serde_json::from_str(&content)?;
            (path.display().to_string(), data)
        }
        (Some(id), None) => {
            let session = Session::from_env(&config.property_api.base_url);
            let client = PropertyClient::new(
                session,
                std::time::Duration::from_secs(config.property_api.timeout_secs),
            )?;
            let property = client.fetch_property(id).await?;
            client.verify_owner(&property).await?;
            let data = PropertyMarketingData::from_property(
                &property,
                Some(&client.session().api_base),
            );
            (id.clone(), data)
        }
        (None, None) => anyhow::bail!("Pass --property <id> or --data <file.json>"),
    };

    let registry = TemplateRegistry::load(&asset_loader)?;
    if let Some(format) = format {
        config.export.format = format;
    }
    let service = MarketingService::new(config, registry, &asset_loader);

    let template = match args.template.as_deref() {
        Some(id) => service.registry().get_template(id)?,
        None => service
            .initial_template(&property_key)
            .ok_or_else(|| anyhow::anyhow!("No templates available"))?,
    }
    .clone();

    let engine = service.engine(args.output_dir);
    engine.select_at(&template, &data, args.image_offset);

    let report = engine.preload().await?;
    if report.failed() > 0 {
        eprintln!(
            "Warning: {} of {} images could not be loaded",
            report.failed(),
            report.outcomes.len()
        );
    }

    if let Some(ref path) = args.preview {
        if let Some(svg) = engine.preview_svg()? {
            std::fs::write(path, svg)?;
            println!("Preview {}", path.display());
        }
    }

    let action = if args.share {
        OutputAction::Share
    } else {
        OutputAction::Download
    };
    match engine.export(action).await? {
        ExportOutcome::Downloaded(path) => println!("Saved {}", path.display()),
        ExportOutcome::FellBackToDownload(path) => {
            println!("Sharing unavailable, saved {}", path.display())
        }
        ExportOutcome::Shared => println!("Shared"),
        ExportOutcome::ShareCancelled => println!("Share cancelled"),
        ExportOutcome::Discarded => println!("Selection changed, nothing exported"),
    }

    service.remember_template(&property_key, &template.id);
    Ok(())
}

/// Print the template catalog
fn run_templates_command() -> anyhow::Result<()> {
    init_cli_logging();

    let registry = TemplateRegistry::load(&AssetLoader::from_env())?;
    for style in registry.list_styles() {
        println!(
            "  {:<14} {:<16} {} photo{}",
            style.id,
            style.name,
            style.image_slots,
            if style.image_slots == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

/// Extract embedded assets to filesystem
fn run_init_command(
    templates: bool,
    config: bool,
    all: bool,
    force: bool,
    list: bool,
) -> anyhow::Result<()> {
    if list {
        println!("Embedded assets:\n");
        println!("Templates:");
        for f in AssetLoader::list_embedded(AssetCategory::Templates) {
            println!("  {f}");
        }
        println!("\nConfig:");
        for f in AssetLoader::list_embedded(AssetCategory::Config) {
            println!("  {f}");
        }
        return Ok(());
    }

    let mut categories = Vec::new();
    if all || templates {
        categories.push(AssetCategory::Templates);
    }
    if all || config {
        categories.push(AssetCategory::Config);
    }

    if categories.is_empty() {
        eprintln!("No categories specified. Use --all, --templates, or --config");
        eprintln!("\nRun 'marketkit init --list' to see embedded assets.");
        std::process::exit(1);
    }

    let report = AssetLoader::from_env().init(&categories, force)?;

    if !report.written.is_empty() {
        println!("Extracted {} files:", report.written.len());
        for f in &report.written {
            println!("  + {f}");
        }
    }
    if !report.skipped.is_empty() {
        println!(
            "\nSkipped {} existing files (use --force to overwrite):",
            report.skipped.len()
        );
        for f in &report.skipped {
            println!("  - {f}");
        }
    }

    if report.written.is_empty() && report.skipped.is_empty() {
        println!("No files to extract.");
    }

    Ok(())
}

/// Display status and configuration information
fn run_status_command() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let bind_addr = std::env::var("BIND_ADDR").ok();
    let config_file = std::env::var("CONFIG_FILE").ok();
    let templates_dir = std::env::var("TEMPLATES_DIR").ok();
    let fonts_dir = std::env::var("FONTS_DIR").ok();
    let session = std::env::var("MARKETKIT_SESSION").ok();
    let token_set = std::env::var("MARKETKIT_TOKEN").is_ok();

    println!("Marketkit v{VERSION}");
    println!("Marketing images for property listings\n");

    println!("Environment Variables:");
    println!(
        "  BIND_ADDR         = {}",
        bind_addr.as_deref().unwrap_or("0.0.0.0:3000 (default)")
    );
    println!(
        "  CONFIG_FILE       = {}",
        config_file.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  TEMPLATES_DIR     = {}",
        templates_dir.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  FONTS_DIR         = {}",
        fonts_dir.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  MARKETKIT_SESSION = {}",
        session.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  MARKETKIT_TOKEN   = {}",
        if token_set { "(set)" } else { "(not set)" }
    );

    println!("\nAsset Sources:");
    let loader = AssetLoader::from_env();

    let config_source = match config_file {
        Some(ref path) if PathBuf::from(path).exists() => path.to_string(),
        Some(_) => "embedded (file not found)".to_string(),
        None => "embedded".to_string(),
    };
    println!("  Config:    {config_source}");

    let embedded_count = AssetLoader::list_embedded(AssetCategory::Templates).len();
    let templates_count = loader.list_templates().len();
    match templates_dir {
        Some(ref path) if PathBuf::from(path).exists() => println!(
            "  Templates: {path} ({templates_count} files, {embedded_count} embedded)"
        ),
        _ => println!("  Templates: embedded ({embedded_count} files)"),
    }

    let fonts_count = loader.get_fonts().len();
    match fonts_dir {
        Some(ref path) => println!("  Fonts:     {path} ({fonts_count} files) + system fonts"),
        None => println!("  Fonts:     system fonts"),
    }

    println!("\nCommands:");
    println!("  marketkit serve       Start the HTTP server");
    println!("  marketkit render      Render a marketing image for a listing");
    println!("  marketkit templates   List the available templates");
    println!("  marketkit init        Extract embedded assets");
    println!("\nRun 'marketkit --help' for more details.");
}

/// Run the HTTP server
async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketkit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let asset_loader = Arc::new(AssetLoader::from_env());

    match asset_loader.seed_if_configured() {
        Ok(report) if !report.is_empty() => {
            tracing::info!(
                templates = report.templates_seeded.len(),
                config = report.config_seeded,
                "Seeded empty directories with embedded assets"
            );
        }
        Err(e) => {
            tracing::warn!(%e, "Failed to seed assets");
        }
        _ => {}
    }

    let state = server::create_app_state(asset_loader)?;
    state.service.warm_up();

    let app = server::build_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Marketkit server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
