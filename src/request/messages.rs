//! User-facing error messages
//!
//! Terminal request failures are shown to users as a short sentence in their
//! language rather than as the raw transport error.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Message table for one language
#[derive(Debug)]
pub struct Messages {
    pub too_many_requests: &'static str,
    pub server_error: &'static str,
    pub timed_out: &'static str,
    pub connection_error: &'static str,
    pub generic: &'static str,
}

const EN: Messages = Messages {
    too_many_requests: "Too many requests. Please wait a moment and try again.",
    server_error: "The server encountered an error. Please try again later.",
    timed_out: "The request timed out. Please try again.",
    connection_error: "Could not connect to the server. Check your connection.",
    generic: "Something went wrong. Please try again.",
};

const ES: Messages = Messages {
    too_many_requests: "Demasiadas solicitudes. Espera un momento e inténtalo de nuevo.",
    server_error: "El servidor encontró un error. Inténtalo de nuevo más tarde.",
    timed_out: "La solicitud tardó demasiado. Inténtalo de nuevo.",
    connection_error: "No se pudo conectar con el servidor. Revisa tu conexión.",
    generic: "Algo salió mal. Inténtalo de nuevo.",
};

/// Language used for user-facing messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

/// Error returned when parsing an unsupported locale code
#[derive(Debug, Error)]
#[error("Unsupported locale: '{0}'. Supported locales: en, es")]
pub struct UnknownLocale(pub String);

impl Locale {
    /// Returns the message table for this locale
    pub fn messages(self) -> &'static Messages {
        match self {
            Locale::En => &EN,
            Locale::Es => &ES,
        }
    }

    /// Returns the two-letter code
    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }
}

impl FromStr for Locale {
    type Err = UnknownLocale;

    /// Accepts bare codes and region-qualified tags like `es-MX` or `en_US.UTF-8`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match lang.as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            _ => Err(UnknownLocale(s.to_string())),
        }
    }
}
