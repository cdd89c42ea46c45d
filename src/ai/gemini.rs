use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::gateway::GeneratedImage;
use crate::media::PendingImage;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    output_mime_type: &'static str,
    aspect_ratio: &'static str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Thin client over the Gemini REST API. Failures come back as typed errors;
/// turning them into something a user can read is the gateway's job.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Swap in a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Single-turn text generation, optionally with one inline image.
    pub async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&PendingImage>,
    ) -> Result<String> {
        let mut parts = vec![RequestPart::Text { text: prompt }];
        if let Some(image) = image {
            parts.push(RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.base64,
                },
            });
        }

        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(%model, with_image = image.is_some(), "generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_text(parsed)
    }

    /// Ask for `count` square PNG images. An empty vector means the service
    /// answered but produced nothing (usually filtered).
    pub async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        count: u32,
    ) -> Result<Vec<GeneratedImage>> {
        let request = PredictRequest {
            instances: vec![PredictInstance { prompt }],
            parameters: PredictParameters {
                sample_count: count,
                output_mime_type: "image/png",
                aspect_ratio: "1:1",
            },
        };

        let url = format!("{}/models/{}:predict", self.base_url, model);
        debug!(%model, count, "predict");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }

        let parsed: PredictResponse = response.json().await?;
        Ok(parsed
            .predictions
            .into_iter()
            .filter_map(|p| {
                let base64 = p.bytes_base64_encoded?;
                Some(GeneratedImage {
                    base64,
                    mime_type: p.mime_type.unwrap_or_else(|| "image/png".to_string()),
                })
            })
            .collect())
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ChatError::EmptyResponse);
    }
    Ok(text)
}

fn api_error(status: StatusCode, body: &str) -> ChatError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{}: {}", status_text, msg),
                _ => msg,
            }
        })
        .unwrap_or_else(|_| body.to_string());

    ChatError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Loopback HTTP server answering every request with one canned response.

    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub struct CannedServer {
        pub base_url: String,
        requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl CannedServer {
        pub async fn start(status: u16, body: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();
            let body = body.to_string();

            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let (head, payload) = read_request(&mut socket).await;
                    seen.lock().unwrap().push((head, payload));

                    let response = format!(
                        "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self {
                base_url: format!("http://{}", addr),
                requests,
            }
        }

        /// (request line + headers, body) for every request seen so far.
        pub fn requests(&self) -> Vec<(String, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return (String::from_utf8_lossy(&buf).into_owned(), String::new());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
        (head, body)
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::CannedServer;
    use super::*;

    #[test]
    fn test_text_only_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart::Text { text: "hi" }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }] })
        );
    }

    #[test]
    fn test_inline_image_part_shape() {
        let part = RequestPart::InlineData {
            inline_data: InlineData { mime_type: "image/png", data: "Zm9v" },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "inlineData": { "mimeType": "image/png", "data": "Zm9v" } })
        );
    }

    #[test]
    fn test_predict_parameters_shape() {
        let params = PredictParameters {
            sample_count: 1,
            output_mime_type: "image/png",
            aspect_ratio: "1:1",
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "sampleCount": 1, "outputMimeType": "image/png", "aspectRatio": "1:1" })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(extract_text(response), Err(ChatError::EmptyResponse)));
    }

    #[test]
    fn test_api_error_uses_error_body() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
        );
        match err {
            ChatError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "INVALID_ARGUMENT: API key not valid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_api_error_with_plain_body() {
        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, ChatError::Api { status: 502, ref message } if message == "upstream down"));
    }

    #[tokio::test]
    async fn test_generate_content_sends_image_part() {
        let server = CannedServer::start(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"A cat."}]}}]}"#,
        )
        .await;
        let client = GeminiClient::new("test-key").with_base_url(&server.base_url);

        let image = PendingImage::new("Zm9v", "image/png");
        let text = client
            .generate_content(DEFAULT_TEXT_MODEL, "Describe this", Some(&image))
            .await
            .unwrap();
        assert_eq!(text, "A cat.");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let (head, body) = &requests[0];
        assert!(head.starts_with("POST /models/gemini-2.5-flash:generateContent"));
        assert!(head.to_lowercase().contains("x-goog-api-key: test-key"));

        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Describe this");
        assert_eq!(parts[1]["inlineData"]["data"], "Zm9v");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    }

    #[tokio::test]
    async fn test_generate_images_parses_predictions() {
        let server = CannedServer::start(
            200,
            r#"{"predictions":[{"bytesBase64Encoded":"AAAA","mimeType":"image/png"}]}"#,
        )
        .await;
        let client = GeminiClient::new("test-key").with_base_url(&server.base_url);

        let images = client
            .generate_images(DEFAULT_IMAGE_MODEL, "a cat", 1)
            .await
            .unwrap();
        assert_eq!(
            images,
            vec![GeneratedImage { base64: "AAAA".into(), mime_type: "image/png".into() }]
        );

        let (head, body) = &server.requests()[0];
        assert!(head.starts_with("POST /models/imagen-4.0-generate-001:predict"));
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["instances"][0]["prompt"], "a cat");
        assert_eq!(body["parameters"]["sampleCount"], 1);
    }

    #[tokio::test]
    async fn test_generate_images_empty_response() {
        let server = CannedServer::start(200, "{}").await;
        let client = GeminiClient::new("test-key").with_base_url(&server.base_url);

        let images = client.generate_images(DEFAULT_IMAGE_MODEL, "a cat", 1).await.unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = CannedServer::start(
            403,
            r#"{"error":{"code":403,"message":"denied","status":"PERMISSION_DENIED"}}"#,
        )
        .await;
        let client = GeminiClient::new("bad-key").with_base_url(&server.base_url);

        let err = client
            .generate_content(DEFAULT_TEXT_MODEL, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Api { status: 403, .. }));
    }
}
