//! Command-line interface for ytbundle.
//!
//! Every command goes through [`Service`] and prints its JSON envelope on
//! stdout. The process exits non-zero when the envelope reports a failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::api::{ApiResponse, Service};
use crate::config::ResolvedConfig;
use crate::container::builder::{AssetSource, BuildAssets};
use crate::domain::ProjectMetadata;

/// ytbundle - single-file media project containers
#[derive(Parser, Debug)]
#[command(name = "ytbundle")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Registry root (overrides the config file)
    #[arg(long, global = true, env = "YTBUNDLE_HOME")]
    pub root: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Metadata fields settable from the command line
#[derive(clap::Args, Debug, Default)]
pub struct MetadataArgs {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub theme: Option<String>,

    #[arg(long)]
    pub template: Option<String>,

    #[arg(long)]
    pub voice: Option<String>,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub font_size: Option<u32>,

    /// Tags (comma-separated)
    #[arg(long)]
    pub tags: Option<String>,
}

impl MetadataArgs {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.theme.is_none()
            && self.template.is_none()
            && self.voice.is_none()
            && self.language.is_none()
            && self.font_size.is_none()
            && self.tags.is_none()
    }

    fn into_metadata(self) -> ProjectMetadata {
        ProjectMetadata {
            title: self.title,
            theme: self.theme,
            template: self.template,
            voice: self.voice,
            language: self.language,
            font_size: self.font_size,
            tags: self
                .tags
                .map(|t| {
                    t.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a container from media files and commit it
    Build {
        /// Project identifier
        project: String,

        /// Video file to embed
        #[arg(long)]
        video: Option<PathBuf>,

        /// Audio file to embed
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Thumbnail image to embed
        #[arg(long)]
        thumbnail: Option<PathBuf>,

        /// Source text file (markdown)
        #[arg(short, long)]
        source: Option<PathBuf>,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Validate a project's container
    Validate {
        project: String,

        /// Also validate every stored version
        #[arg(long, conflicts_with = "fix")]
        all: bool,

        /// Write auto-fix repairs back to the active container
        #[arg(long)]
        fix: bool,
    },

    /// Show project metadata, or update it when any field is given
    Meta {
        project: String,

        #[command(flatten)]
        update: MetadataArgs,
    },

    /// List stored versions of a project
    Versions { project: String },

    /// Restore a stored version (e.g. `3` or `v3`)
    Restore { project: String, version: String },

    /// Probe a project's media payloads
    CheckMedia {
        project: String,

        /// Fail unless the project can start playback
        #[arg(long)]
        require_playable: bool,
    },

    /// Delete a project and its whole version history
    Delete {
        project: String,

        /// Confirm the irreversible deletion
        #[arg(long)]
        yes: bool,
    },

    /// List all projects
    List,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        let mut config = ResolvedConfig::load()?;
        if let Some(root) = self.root {
            config.root = root;
        }
        let pretty = self.pretty;

        if let Commands::Config = self.command {
            print_json(&config_summary(&config), pretty)?;
            return Ok(ExitCode::SUCCESS);
        }

        let service = Service::new(&config).context("Failed to initialise service")?;

        match self.command {
            Commands::Build {
                project,
                video,
                audio,
                thumbnail,
                source,
                metadata,
            } => {
                let source_text = match source {
                    Some(path) => tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read source text {}", path.display()))?,
                    None => String::new(),
                };
                let mut assets = BuildAssets::new(source_text);
                assets.video = video.map(AssetSource::File);
                assets.audio = audio.map(AssetSource::File);
                assets.thumbnail = thumbnail.map(AssetSource::File);

                let response = service
                    .build(&project, assets, metadata.into_metadata())
                    .await;
                emit(&response, pretty)
            }
            Commands::Validate { project, all, fix } => {
                if fix {
                    emit(&service.repair(&project).await, pretty)
                } else if all {
                    emit(&service.validate_all(&project).await, pretty)
                } else {
                    emit(&service.validate(&project).await, pretty)
                }
            }
            Commands::Meta { project, update } => {
                if update.is_empty() {
                    emit(&service.get_metadata(&project).await, pretty)
                } else {
                    let response = service
                        .update_metadata(&project, update.into_metadata())
                        .await;
                    emit(&response, pretty)
                }
            }
            Commands::Versions { project } => emit(&service.list_versions(&project).await, pretty),
            Commands::Restore { project, version } => {
                emit(&service.restore_version(&project, &version).await, pretty)
            }
            Commands::CheckMedia {
                project,
                require_playable,
            } => {
                if require_playable {
                    emit(&service.check_playable(&project).await, pretty)
                } else {
                    emit(&service.check_media(&project).await, pretty)
                }
            }
            Commands::Delete { project, yes } => {
                if !yes {
                    anyhow::bail!("Refusing to delete {} without --yes", project);
                }
                emit(&service.delete_project(&project).await, pretty)
            }
            Commands::List => emit(&service.list_projects().await, pretty),
            Commands::Config => Ok(ExitCode::SUCCESS),
        }
    }
}

fn emit<T: Serialize>(response: &ApiResponse<T>, pretty: bool) -> Result<ExitCode> {
    print_json(response, pretty)?;
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn config_summary(config: &ResolvedConfig) -> serde_json::Value {
    serde_json::json!({
        "config_file": config.config_file.as_ref().map(|p| p.display().to_string()),
        "root": config.root.display().to_string(),
        "build": {
            "max_embedded_bytes": config.build.max_embedded_bytes,
            "required_media": config.build.required_media,
            "missing_media_tolerance": config.build.missing_media_tolerance,
        },
        "validator": {
            "backend": format!("{:?}", config.validator.backend).to_lowercase(),
            "max_fix_attempts": config.validator.max_fix_attempts,
        },
        "media": {
            "silence_threshold_db": config.media.silence_threshold_db,
        },
    })
}
