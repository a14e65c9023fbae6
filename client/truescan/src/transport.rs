use std::{path::Path, time::Duration};

use reqwest::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    multipart::{Form, Part},
    Client, Request, RequestBuilder, StatusCode, Url,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

const LOG_BODY_LIMIT: usize = 2000;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    // The connect timeout is the only transport-level timeout; pollers own
    // the overall time budget.
    pub fn new(connect_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url)
    }

    pub async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let mut request = request.build()?;
        if !request.headers().contains_key(ACCEPT) {
            request
                .headers_mut()
                .insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        log_request(&request);

        let response = self.client.execute(request).await.map_err(|err| {
            tracing::warn!(error = %err, "transport error");
            ApiError::Transport(err)
        })?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                body = %truncate(&text, LOG_BODY_LIMIT),
                "request failed"
            );
            if status == StatusCode::UNAUTHORIZED {
                return Err(ApiError::Unauthorized);
            }
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: (!text.is_empty()).then_some(text),
            });
        }

        tracing::debug!(
            status = status.as_u16(),
            url = %url,
            body = %truncate(&String::from_utf8_lossy(&body), LOG_BODY_LIMIT),
            "response"
        );

        serde_json::from_slice(&body).map_err(|err| {
            tracing::warn!(error = %err, url = %url, "decoding error");
            ApiError::Decode(err)
        })
    }
}

fn log_request(request: &Request) {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| mask_token(value.trim_start_matches("Bearer ")));
    tracing::debug!(
        method = %request.method(),
        url = %request.url(),
        authorization = authorization.as_deref().unwrap_or("-"),
        "request"
    );
}

// Keeps only the ends of a token so logs stay correlatable without leaking it.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return format!("***{}***", chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}…{tail}")
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        Self {
            name: name.into(),
            mime_type: mime_for(&filename).to_string(),
            filename,
            data,
        }
    }

    pub fn jpeg(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(name, "image.jpg", data)
    }

    pub fn renamed(self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self
        }
    }

    fn into_part(self) -> Result<(String, Part), ApiError> {
        let part = Part::bytes(self.data)
            .file_name(self.filename)
            .mime_str(&self.mime_type)?;
        Ok((self.name, part))
    }
}

pub fn mime_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

// Text fields with `None` values are left out of the form.
pub fn multipart_form(
    fields: &[(&'static str, Option<&str>)],
    files: Vec<FilePart>,
) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for (name, value) in fields {
        if let Some(value) = value {
            form = form.text(*name, value.to_string());
        }
    }
    for file in files {
        let (name, part) = file.into_part()?;
        form = form.part(name, part);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for("chat.JPG"), "image/jpeg");
        assert_eq!(mime_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_for("screen.png"), "image/png");
        assert_eq!(mime_for("export.pdf"), "application/pdf");
        assert_eq!(mime_for("chat.txt"), "text/plain");
        assert_eq!(mime_for("archive.zip"), "application/octet-stream");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[test]
    fn tokens_are_masked() {
        assert_eq!(mask_token("short"), "***5***");
        assert_eq!(mask_token("abcdef0123456789xyz"), "abcdef…789xyz");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("привет", 3), "при");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[test]
    fn file_part_keeps_mime_when_renamed() {
        let part = FilePart::new("files", "shot.png", vec![1, 2, 3]).renamed("file");
        assert_eq!(part.name, "file");
        assert_eq!(part.mime_type, "image/png");
        assert_eq!(part.data, vec![1, 2, 3]);
    }
}
