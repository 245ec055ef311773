mod artifact;
mod config;
mod content;
mod error;
mod gateway;
mod models;
mod normalize;
mod pipeline;
mod rank;
mod session;
mod video;

use crate::artifact::{CachedArtifactSource, DirArtifactSource};
use crate::config::{AppPaths, Settings};
use crate::content::ContentTable;
use crate::error::{Error, Result};
use crate::gateway::ModelGateway;
use crate::models::LabelContent;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;
use std::sync::Arc;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let image_path = args.next().ok_or_else(|| {
        Error::Config("Usage: labelscope <image-file> [--label <label>]".into())
    })?;
    let mut selected_label = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--label" => {
                selected_label = Some(args.next().ok_or_else(|| {
                    Error::Config("--label requires a value".into())
                })?);
            }
            other => return Err(Error::Config(format!("Unknown argument: {other}"))),
        }
    }

    let paths = AppPaths::discover()?;
    let settings = Settings::load(&paths.root)?;

    let artifacts = CachedArtifactSource::new(
        DirArtifactSource::new(&paths.models_dir),
        &paths.cache_dir,
    );
    let gateway = Arc::new(ModelGateway::new(settings.classifier, Arc::new(artifacts)));
    let content = if paths.content_table_path.exists() {
        ContentTable::load(&paths.content_table_path)?
    } else {
        log::warn!(
            "No content table at {}; content panels will be empty",
            paths.content_table_path.display()
        );
        ContentTable::default()
    };
    let pipeline = Pipeline::new(gateway, content, Arc::new(SessionStore::new()));

    let vocabulary = pipeline.vocabulary()?;
    println!("Classifiable labels: {}", vocabulary.join(", "));

    let raw = std::fs::read(&image_path)?;
    let session_id = pipeline.sessions().create();
    let outcome = pipeline.classify(session_id, &raw)?;

    println!();
    println!("Prediction: {}", outcome.predicted_label);
    println!();
    println!("Probabilities:");
    for entry in &outcome.ranked {
        let marker = if entry.label == outcome.predicted_label {
            " <"
        } else {
            ""
        };
        println!("  {:>8}  {}{}", entry.percent(), entry.label, marker);
    }

    let panel_label = selected_label.as_deref().unwrap_or(&outcome.predicted_label);
    let panel = if panel_label == outcome.predicted_label {
        outcome.content
    } else {
        pipeline.content_for(panel_label)
    };
    print_panel(panel_label, &panel);
    Ok(())
}

fn print_panel(label: &str, panel: &LabelContent) {
    println!();
    println!("Content for '{label}':");
    if panel.is_empty() {
        println!("  (no content authored for this label)");
        return;
    }
    for text in &panel.texts {
        println!("  text:  {text}");
    }
    for locator in &panel.images {
        println!("  image: {}", display_locator(locator));
    }
    for video in &panel.videos {
        match &video.thumbnail_url {
            Some(thumb) => println!("  video: {} (thumbnail {thumb})", video.original_url),
            None => println!("  video: {}", video.original_url),
        }
    }
}

/// Embedded data-URI locators can run to kilobytes; keep terminal output
/// readable.
fn display_locator(locator: &str) -> String {
    const MAX: usize = 72;
    if locator.chars().count() > MAX {
        let head: String = locator.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        locator.to_string()
    }
}
