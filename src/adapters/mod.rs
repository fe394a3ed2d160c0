// Concrete implementations of the domain ports: filesystem, geocoding service, text model.

pub mod gemini;
pub mod nominatim;
pub mod storage;

pub use gemini::GeminiClient;
pub use nominatim::NominatimGeocoder;
pub use storage::LocalStorage;
