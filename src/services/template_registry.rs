use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use utoipa::ToSchema;

use crate::assets::AssetLoader;
use crate::models::{MarketingTemplate, ValidationError};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to parse template {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid template {file}: {source}")]
    Invalid {
        file: String,
        #[source]
        source: ValidationError,
    },

    #[error("Duplicate template id '{id}' in {file}")]
    Duplicate { id: String, file: String },

    #[error("Failed to read template: {0}")]
    Io(#[from] std::io::Error),
}

/// What the template picker shows for one template
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub accent: String,
    pub icon: String,
    pub thumbnail: String,
    /// Number of listing photos the layout uses
    pub image_slots: usize,
}

/// The fixed catalog of marketing templates.
///
/// Loaded once at startup; every template is validated while loading so
/// rendering never meets a malformed one.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<MarketingTemplate>,
}

impl TemplateRegistry {
    /// Registry over the embedded templates only
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::load(&AssetLoader::new(None, None, None))
    }

    /// Load every `*.yaml` template the asset loader knows about
    pub fn load(loader: &AssetLoader) -> Result<Self, TemplateError> {
        let mut templates = Vec::new();
        for file in loader.list_templates() {
            let content = loader.read_template_string(&file)?;
            let template: MarketingTemplate =
                serde_yaml::from_str(&content).map_err(|e| TemplateError::Parse {
                    file: file.clone(),
                    message: e.to_string(),
                })?;
            template.validate().map_err(|source| TemplateError::Invalid {
                file: file.clone(),
                source,
            })?;
            tracing::debug!(id = %template.id, file = %file, "Loaded template");
            templates.push((file, template));
        }

        let mut seen = HashSet::new();
        for (file, template) in &templates {
            if !seen.insert(template.id.clone()) {
                return Err(TemplateError::Duplicate {
                    id: template.id.clone(),
                    file: file.clone(),
                });
            }
        }

        let registry = Self::from_templates(templates.into_iter().map(|(_, t)| t).collect());
        tracing::info!(templates = registry.templates.len(), "Template registry loaded");
        Ok(registry)
    }

    /// Build a registry from already validated templates
    pub fn from_templates(mut templates: Vec<MarketingTemplate>) -> Self {
        templates.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Self { templates }
    }

    /// All templates in picker order
    pub fn list_templates(&self) -> &[MarketingTemplate] {
        &self.templates
    }

    pub fn list_styles(&self) -> Vec<TemplateSummary> {
        self.templates
            .iter()
            .map(|t| TemplateSummary {
                id: t.id.clone(),
                name: t.name.clone(),
                accent: t.style.accent.clone(),
                icon: t.style.icon.clone(),
                thumbnail: t.thumbnail.clone(),
                image_slots: t.image_slot_count(),
            })
            .collect()
    }

    pub fn get_template(&self, id: &str) -> Result<&MarketingTemplate, TemplateError> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// The template selected when nothing else is
    pub fn default_template(&self) -> Option<&MarketingTemplate> {
        self.templates.first()
    }

    /// `id` when it names a known template, else the default
    pub fn resolve(&self, id: Option<&str>) -> Option<&MarketingTemplate> {
        id.and_then(|id| self.get_template(id).ok())
            .or_else(|| self.default_template())
    }
}
