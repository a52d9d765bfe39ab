// Configuration loading
// Loaded from ~/.config/monxml/settings.json

pub mod settings;

pub use settings::Settings;
