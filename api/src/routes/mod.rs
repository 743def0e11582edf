pub mod analysis;
pub mod audio;
pub mod conversations;
pub mod health;
pub mod sessions;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Cursor;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::{SESSION_ID_HEADER, SESSION_TOKEN_HEADER};
    use crate::providers::ModelChain;
    use crate::state::AppState;

    const BOUNDARY: &str = "curio-test-boundary";

    pub struct TestSession {
        pub id: String,
        pub token: String,
    }

    /// Every route group on one router, without rate limiting (the governor
    /// key extractor needs a peer address that `oneshot` does not provide).
    pub struct TestApp {
        pub state: AppState,
        pub dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let state = AppState::for_tests(dir.path(), ModelChain::default());
            Self { state, dir }
        }

        fn router(&self) -> Router {
            Router::new()
                .merge(super::health::router())
                .merge(super::sessions::router())
                .merge(super::uploads::router())
                .merge(super::uploads::read_router())
                .merge(super::analysis::write_router())
                .merge(super::analysis::read_router())
                .merge(super::conversations::router())
                .merge(super::audio::router())
                .with_state(self.state.clone())
        }

        pub fn session(&self) -> TestSession {
            let issued = self.state.sessions.create_session();
            TestSession {
                id: issued.session_id,
                token: issued.session_token,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.router()
                .oneshot(request)
                .await
                .expect("request should succeed")
        }

        fn builder(method: &str, uri: &str, session: Option<&TestSession>) -> axum::http::request::Builder {
            let builder = Request::builder().method(method).uri(uri);
            match session {
                Some(session) => builder
                    .header(SESSION_ID_HEADER, session.id.as_str())
                    .header(SESSION_TOKEN_HEADER, session.token.as_str()),
                None => builder,
            }
        }

        pub async fn get(&self, uri: &str, session: Option<&TestSession>) -> Response<Body> {
            let request = Self::builder("GET", uri, session)
                .body(Body::empty())
                .expect("request should build");
            self.send(request).await
        }

        pub async fn post_json(
            &self,
            uri: &str,
            session: Option<&TestSession>,
            body: Value,
        ) -> Response<Body> {
            let request = Self::builder("POST", uri, session)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request should build");
            self.send(request).await
        }

        pub async fn post_file(
            &self,
            uri: &str,
            session: Option<&TestSession>,
            field: &str,
            file_name: &str,
            content_type: &str,
            bytes: Vec<u8>,
        ) -> Response<Body> {
            let mut body = format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .into_bytes();
            body.extend_from_slice(&bytes);
            body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

            let request = Self::builder("POST", uri, session)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("request should build");
            self.send(request).await
        }

        pub async fn upload_png(&self, session: &TestSession, file_name: &str) -> String {
            let response = self
                .post_file("/v1/uploads", Some(session), "image", file_name, "image/png", png_bytes())
                .await;
            json_body(response).await["upload_id"]
                .as_str()
                .expect("upload_id")
                .to_string()
        }

        pub async fn poll_until_terminal(&self, session: &TestSession, analysis_id: &str) -> Value {
            for _ in 0..200 {
                let body = json_body(
                    self.get(&format!("/v1/analysis/{analysis_id}"), Some(session))
                        .await,
                )
                .await;
                if matches!(body["status"].as_str(), Some("ready" | "failed")) {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("analysis {analysis_id} did not finish");
        }

        /// Upload, analyze and wait; returns the conversation id.
        pub async fn ready_conversation(&self, session: &TestSession, file_name: &str) -> String {
            let upload_id = self.upload_png(session, file_name).await;
            let created = json_body(
                self.post_json(
                    "/v1/analysis",
                    Some(session),
                    serde_json::json!({ "upload_id": upload_id }),
                )
                .await,
            )
            .await;
            let analysis_id = created["analysis_id"].as_str().expect("analysis_id");
            let result = self.poll_until_terminal(session, analysis_id).await;
            result["conversation_id"]
                .as_str()
                .expect("conversation_id")
                .to_string()
        }
    }

    pub fn png_bytes() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(32, 24, Rgb([30, 120, 200]))
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png fixture");
        out.into_inner()
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&bytes).expect("body should be json")
    }
}
