// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `telesave scan`: report blob files no archived message references.

use std::collections::HashSet;
use std::path::PathBuf;

use telesave_config::model::TelesaveConfig;
use telesave_core::{ArchiveStore, TelesaveError};
use telesave_storage::{BlobSink, SqliteArchive};
use tracing::info;

pub async fn run_scan(config: &TelesaveConfig) -> Result<(), TelesaveError> {
    let store = SqliteArchive::new(config.storage.clone());
    store.initialize().await?;
    let blobs = BlobSink::new(&config.storage.store_path);

    let unreferenced = unreferenced_blobs(&store, &blobs).await?;
    store.close().await?;

    info!(count = unreferenced.len(), "scan finished");
    for path in &unreferenced {
        println!("{}", path.display());
    }
    println!("{} unreferenced blob files", unreferenced.len());
    Ok(())
}

pub async fn unreferenced_blobs(
    store: &dyn ArchiveStore,
    blobs: &BlobSink,
) -> Result<Vec<PathBuf>, TelesaveError> {
    let referenced: HashSet<String> = store.list_blob_paths().await?.into_iter().collect();
    blobs.scan_unreferenced(&referenced).await
}
