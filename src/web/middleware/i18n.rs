use axum::{
    body::Body as AxumBody,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

const FALLBACK_LOCALE: &str = "en";

tokio::task_local! {
    // Locale of the request being served by the current task.
    static REQUEST_LOCALE: String;
}

/// Picks the first language tag of `Accept-Language`, ignoring its quality value.
fn preferred_locale(accept_language: Option<&str>) -> String {
    accept_language
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.split(';').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "*")
        .unwrap_or(FALLBACK_LOCALE)
        .to_string()
}

/// The locale chosen for the request in flight, or the fallback outside a request.
pub fn current_locale() -> String {
    REQUEST_LOCALE
        .try_with(|locale| locale.clone())
        .unwrap_or_else(|_| FALLBACK_LOCALE.to_string())
}

/// Translates `key` into the locale of the request in flight.
pub fn localized(key: &str) -> String {
    let locale = current_locale();
    t!(key, locale = locale.as_str()).into_owned()
}

pub async fn i18n_middleware(req: Request<AxumBody>, next: Next) -> Response {
    let locale = preferred_locale(
        req.headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    );

    REQUEST_LOCALE.scope(locale, next.run(req)).await
}
