// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Label document storage.
//!
//! Documents live under a root directory and are addressed by relative keys
//! such as `labels/FedEx/1001_0.pdf`. Clients download them through signed,
//! short-lived URLs served by `GET /labels/files/{token}`.
//!

use std::path::{Component, Path, PathBuf};

use crate::error::Error;
use crate::security::TokenService;

#[derive(Clone)]
pub struct LabelStore {
    root: PathBuf,
    public_url: String,
    tokens: TokenService,
    http: reqwest::Client,
}

impl LabelStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str, tokens: TokenService) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_owned(),
            tokens,
            http: reqwest::Client::new(),
        }
    }

    /// Key of the `idx`-th document bought for an order.
    pub fn label_key(carrier: &str, order_ref: &str, idx: usize, extension: &str) -> String {
        format!(
            "labels/{}/{}_{}.{}",
            sanitize(carrier),
            sanitize(order_ref),
            idx,
            extension
        )
    }

    /// Key of an uploaded document.
    pub fn upload_key(id: &str, filename: &str) -> String {
        format!("labels/uploads/{}_{}", id, sanitize(filename))
    }

    fn path_of(&self, key: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(Error::BadRequest(format!("Invalid storage key {}", key)));
        }
        Ok(self.root.join(relative))
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), Error> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("Storage error: {}", e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Internal(format!("Storage error: {}", e)))?;
        log::debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    /// Download a document from a carrier URL and store it under `key`.
    pub async fn fetch_and_put(&self, url: &str, key: &str) -> Result<(), Error> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::External(format!(
                "Label download failed with status {}",
                status.as_u16()
            )));
        }
        let bytes = response.bytes().await?;
        self.put(key, &bytes).await
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, Error> {
        let path = self.path_of(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("File {} not found", key)),
            _ => Error::Internal(format!("Storage error: {}", e)),
        })
    }

    /// Public download URL of a stored document.
    pub fn signed_url(&self, key: &str) -> Result<String, Error> {
        let token = self.tokens.download_token(key)?;
        Ok(format!("{}/labels/files/{}", self.public_url, token))
    }

    /// Key granted by a download token.
    pub fn key_of_token(&self, token: &str) -> Result<String, Error> {
        self.tokens
            .verify_download_token(token)
            .ok_or_else(|| Error::NotFound("Invalid or expired link".to_owned()))
    }
}

/// Keep a key segment to characters safe in file names.
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_owned(),
        s => s.to_owned(),
    }
}

/// File extension of a label document with the given content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("png") {
        "png"
    } else if content_type.contains("zpl") {
        "zpl"
    } else if content_type.contains("jpeg") || content_type.contains("jpg") {
        "jpg"
    } else if content_type.contains("gif") {
        "gif"
    } else {
        "pdf"
    }
}

/// Content type served for a stored key.
pub fn content_type_of(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("zpl") => "application/zpl",
        _ => "application/pdf",
    }
}
