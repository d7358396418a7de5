//! Firebase App
//!
//! # C++ Reference
//! - `app/src/app_common.cc` - App instance management
//! - `app/src/include/firebase/app.h` - App class
//!
//! The App is the central configuration object service instances attach to.
//! Each app name has at most one App instance; the global name→instance map
//! is lazily initialized and lives for the whole process.

use crate::error::AppError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name of the app returned by [`App::get_instance`].
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

/// Global map of App names to App instances
static APP_INSTANCES: Lazy<RwLock<HashMap<String, App>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Firebase App instance
///
/// Holds the project configuration that service modules read when they are
/// initialized. Each app name has at most one App instance (singleton
/// pattern); `App` itself is a cheap clone-able handle.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    name: String,
    options: AppOptions,
}

/// Firebase App configuration options
///
/// Deserializable so desktop configurations can be loaded straight from a
/// JSON config file; see [`AppOptions::from_json`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppOptions {
    /// Firebase API key
    pub api_key: String,
    /// Google Cloud project ID
    pub project_id: String,
    /// App name (optional, defaults to "[DEFAULT]")
    #[serde(default)]
    pub app_name: Option<String>,
}

impl AppOptions {
    /// Parse options from a JSON configuration string.
    ///
    /// # Example
    /// ```
    /// use firebase_app_core::AppOptions;
    ///
    /// let options = AppOptions::from_json(
    ///     r#"{"api_key": "KEY", "project_id": "my-project"}"#,
    /// ).unwrap();
    /// assert_eq!(options.project_id, "my-project");
    /// ```
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl App {
    /// Create a new Firebase App with the given options
    ///
    /// If an app with the same name already exists, returns the existing
    /// instance.
    ///
    /// # Example
    /// ```no_run
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// use firebase_app_core::{App, AppOptions};
    ///
    /// let options = AppOptions {
    ///     api_key: "YOUR_API_KEY".to_string(),
    ///     project_id: "your-project-id".to_string(),
    ///     app_name: None,
    /// };
    /// let app = App::create(options).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create(options: AppOptions) -> Result<Self, AppError> {
        // Validate options (error case first)
        if options.api_key.is_empty() {
            return Err(AppError::ApiKeyNotConfigured);
        }
        if options.project_id.is_empty() {
            return Err(AppError::ProjectIdNotConfigured);
        }

        let name = match options.app_name.clone() {
            None => DEFAULT_APP_NAME.to_string(),
            Some(n) => n,
        };

        let mut instances = APP_INSTANCES.write().await;

        // Check if instance already exists
        if let Some(app) = instances.get(&name) {
            return Ok(app.clone());
        }

        // Create new App instance
        let app = App {
            inner: Arc::new(AppInner {
                name: name.clone(),
                options,
            }),
        };

        instances.insert(name, app.clone());

        Ok(app)
    }

    /// Create an App from a JSON configuration string.
    pub async fn create_from_json(json: &str) -> Result<Self, AppError> {
        Self::create(AppOptions::from_json(json)?).await
    }

    /// Get the default Firebase App instance
    ///
    /// Returns the app with name "[DEFAULT]" if it exists.
    pub async fn get_instance() -> Result<Self, AppError> {
        let instances = APP_INSTANCES.read().await;
        instances
            .get(DEFAULT_APP_NAME)
            .cloned()
            .ok_or_else(|| AppError::NotFound(DEFAULT_APP_NAME.to_string()))
    }

    /// Get a named Firebase App instance
    pub async fn get_instance_with_name(name: &str) -> Result<Self, AppError> {
        let instances = APP_INSTANCES.read().await;
        instances
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    /// Get the app name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the app options
    pub fn options(&self) -> &AppOptions {
        &self.inner.options
    }
}
