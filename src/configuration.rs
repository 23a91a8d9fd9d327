use crate::notify::{update_field, Notifier};
use config::{Config, File, FileFormat};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use url::Url;

/// Default API endpoint.
pub const API_URL: &str = "https://openapi.alphaess.com/api";
/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

const CONFIG_FILE_NAME: &str = "alphacloud.ini";

/* keys are case-sensitive */
const KEY_API_URL: &str = "Api.ApiUrl";
const KEY_APP_ID: &str = "Api.AppId";
const KEY_APP_SECRET: &str = "Api.AppSecret";
const KEY_TIMEOUT: &str = "Api.Timeout";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationEvent {
    ApiUrlChanged(String),
    AppIdChanged(String),
    AppSecretChanged,
    RequestTimeoutChanged(u64),
    ValidChanged(bool),
}

/// API endpoint and credentials.
#[derive(Debug)]
pub struct Configuration {
    api_url: String,
    app_id: String,
    app_secret: String,
    request_timeout: u64,
    notifier: Notifier<ConfigurationEvent>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            api_url: String::from(API_URL),
            app_id: String::new(),
            app_secret: String::new(),
            request_timeout: DEFAULT_TIMEOUT_MS,
            notifier: Notifier::new(),
        }
    }
}

impl Clone for Configuration {
    fn clone(&self) -> Self {
        Configuration {
            api_url: self.api_url.clone(),
            app_id: self.app_id.clone(),
            app_secret: self.app_secret.clone(),
            request_timeout: self.request_timeout,
            notifier: Notifier::new(),
        }
    }
}

/// Location of the default configuration file, `<config dir>/alphacloud.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn is_valid_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

impl Configuration {
    pub fn new(api_url: &str, app_id: &str, app_secret: &str) -> Self {
        Configuration {
            api_url: String::from(api_url),
            app_id: String::from(app_id),
            app_secret: String::from(app_secret),
            ..Default::default()
        }
    }

    /// Reads `path`, falling back to the defaults if it cannot be read.
    pub fn load(path: &Path) -> Self {
        let mut configuration = Configuration::default();
        configuration.load_from_file(path);
        configuration
    }

    /// Reads the default configuration file, see `default_config_path()`.
    pub fn load_default() -> Self {
        let mut configuration = Configuration::default();
        configuration.load_from_default_file();
        configuration
    }

    pub fn load_from_default_file(&mut self) -> bool {
        match default_config_path() {
            Some(path) => self.load_from_file(&path),
            None => {
                log::warn!("No configuration directory available on this platform");
                false
            }
        }
    }

    /// Loads the `[Api]` section of the INI file at `path`.
    ///
    /// Leaves the configuration untouched and returns false if the file cannot be read or parsed.
    /// Otherwise all fields are assigned, missing or invalid entries reset to their default, and
    /// `valid()` is returned.
    pub fn load_from_file(&mut self, path: &Path) -> bool {
        let mut settings = Config::default();
        if let Err(e) = settings.merge(File::from(path).format(FileFormat::Ini)) {
            log::warn!("Failed to read configuration {}: {}", path.display(), e);
            return false;
        }

        let api_url = settings
            .get_str(KEY_API_URL)
            .ok()
            .filter(|url| is_valid_url(url))
            .unwrap_or_else(|| String::from(API_URL));
        self.set_api_url(&api_url);

        self.set_app_id(&settings.get_str(KEY_APP_ID).unwrap_or_default());
        self.set_app_secret(&settings.get_str(KEY_APP_SECRET).unwrap_or_default());

        let timeout = settings
            .get_int(KEY_TIMEOUT)
            .unwrap_or(DEFAULT_TIMEOUT_MS as i64);
        self.set_request_timeout(timeout);

        self.valid()
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn set_api_url(&mut self, api_url: &str) {
        let was_valid = self.valid();
        if update_field(
            &mut self.api_url,
            String::from(api_url),
            &self.notifier,
            ConfigurationEvent::ApiUrlChanged,
        ) {
            self.notify_valid(was_valid);
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn set_app_id(&mut self, app_id: &str) {
        let was_valid = self.valid();
        if update_field(
            &mut self.app_id,
            String::from(app_id),
            &self.notifier,
            ConfigurationEvent::AppIdChanged,
        ) {
            self.notify_valid(was_valid);
        }
    }

    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub fn set_app_secret(&mut self, app_secret: &str) {
        let was_valid = self.valid();
        if update_field(
            &mut self.app_secret,
            String::from(app_secret),
            &self.notifier,
            |_| ConfigurationEvent::AppSecretChanged,
        ) {
            self.notify_valid(was_valid);
        }
    }

    /// Request timeout in milliseconds, 0 disables it.
    pub fn request_timeout(&self) -> u64 {
        self.request_timeout
    }

    /// Negative values are ignored.
    pub fn set_request_timeout(&mut self, request_timeout: i64) {
        if request_timeout < 0 {
            log::warn!("Ignoring negative request timeout {}", request_timeout);
            return;
        }
        update_field(
            &mut self.request_timeout,
            request_timeout as u64,
            &self.notifier,
            ConfigurationEvent::RequestTimeoutChanged,
        );
    }

    pub fn valid(&self) -> bool {
        is_valid_url(&self.api_url) && !self.app_id.is_empty() && !self.app_secret.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent> {
        self.notifier.subscribe()
    }

    fn notify_valid(&self, was_valid: bool) {
        let valid = self.valid();
        if valid != was_valid {
            self.notifier.emit(ConfigurationEvent::ValidChanged(valid));
        }
    }
}
