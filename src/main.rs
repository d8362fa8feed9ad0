// src/main.rs
//
// Batch driver: run the tracked SCTLD pipeline over every video in the
// configured input directory and store annotated copies alongside a
// per-video summary.

use anyhow::{Context, Result};
use sctld_detection::registry::ModelRegistry;
use sctld_detection::service;
use sctld_detection::storage::LocalArtifactStore;
use sctld_detection::types::{Config, Thresholds};
use std::path::PathBuf;
use tracing::{error, info};
use walkdir::WalkDir;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("sctld_detection=info,sctld_batch=info,ort=warn")
        .init();

    info!("🪸 SCTLD Detection Pipeline Starting");

    let config = Config::load("config.yaml").context("loading config.yaml")?;
    info!("✓ Configuration loaded");
    info!(
        "Thresholds: detect={:.2}, classify={:.2}, frame_skip={}",
        config.detection.detect_conf_threshold,
        config.detection.classify_conf_threshold,
        config.video.frame_skip
    );

    let registry = ModelRegistry::load(&config).context("loading models")?;
    info!("✓ Models ready");

    let videos = find_video_files(&config.video.input_dir);
    if videos.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }
    info!("Found {} video file(s) to process", videos.len());

    let store = LocalArtifactStore::new(&config.video.output_dir);
    let thresholds = Thresholds {
        detect_conf: config.detection.detect_conf_threshold,
        classify_conf: config.detection.classify_conf_threshold,
    };

    for (idx, path) in videos.iter().enumerate() {
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            videos.len(),
            path.display()
        );

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };

        match service::assess_video(
            &registry,
            &bytes,
            config.video.frame_skip,
            &thresholds,
            &store,
        ) {
            Ok(summary) => {
                info!("✓ Video processed successfully!");
                info!("  Coverage loss: {:.2}%", summary.coverage_ratio * 100.0);
                info!("  Unique corals: {}", summary.unique_corals);
                info!("  Output: {}", summary.output_ref);
                info!("  Summary: {}", serde_json::to_string(&summary)?);
            }
            Err(e) => {
                error!("Failed to process {}: {}", path.display(), e);
            }
        }
    }

    Ok(())
}

fn find_video_files(input_dir: &str) -> Vec<PathBuf> {
    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    let mut videos = Vec::new();
    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }
    videos
}
