//! REST API handlers.
//!
//! Each write handler loads the documents an action touches, runs the
//! matching reducer in a fresh `Store` and turns the resulting state (or its
//! `last_error`) into a response. Error mapping lives in [`errors`].

pub mod earnings;
pub mod engagement;
pub mod errors;
pub mod events;
pub mod payouts;
pub mod push;
pub mod refunds;
pub mod reviews;
pub mod session;
pub mod staff;
pub mod verification;

use crate::types::UserId;
use axum::extract::Multipart;
use eventhaiti_core::files::FileUpload;
use eventhaiti_core::reducer::Reducer;
use eventhaiti_runtime::Store;
use eventhaiti_web::{AppError, Identity};
use std::collections::HashMap;
use std::fmt::Debug;

/// User id of a verified caller.
#[must_use]
pub fn caller(identity: &Identity) -> UserId {
    UserId::new(identity.uid.clone())
}

/// Run `action` through `reducer` over `state` and return the final state.
///
/// # Errors
///
/// Store failures (shutdown, runaway feedback).
pub async fn run<R>(reducer: R, state: R::State, environment: R::Environment, action: R::Action) -> Result<R::State, AppError>
where
    R: Reducer + Send + Sync,
    R::State: Send + Sync,
    R::Action: Send + Debug,
    R::Environment: Send + Sync,
{
    let store = Store::new(state, reducer, environment);
    store.send(action).await?;
    Ok(store.into_state())
}

/// Text fields and the `file` part of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    /// Non-file fields by name
    pub fields: HashMap<String, String>,
    /// The `file` part
    pub file: Option<FileUpload>,
}

impl UploadForm {
    /// Read every part of `multipart`.
    ///
    /// # Errors
    ///
    /// Malformed multipart bodies (400).
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Invalid file part: {e}")))?;
                form.file = Some(FileUpload::new(file_name, content_type, bytes.to_vec()));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Invalid form field {name}: {e}")))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A required text field.
    ///
    /// # Errors
    ///
    /// 400 when the field is missing or blank.
    pub fn field(&self, name: &str) -> Result<&str, AppError> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::bad_request(format!("Missing form field: {name}")))
    }

    /// The uploaded file.
    ///
    /// # Errors
    ///
    /// 400 when no `file` part was sent.
    pub fn take_file(&mut self) -> Result<FileUpload, AppError> {
        self.file.take().ok_or_else(|| AppError::bad_request("Missing file"))
    }
}
