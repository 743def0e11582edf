use std::path::Path;

use crate::util::{SessionCredentials, upload_file};

pub async fn image(
    api_url: &str,
    session: &SessionCredentials,
    file: &Path,
    content_type: Option<&str>,
    raw: bool,
) -> i32 {
    upload_file(api_url, "/v1/uploads", session, "image", file, content_type, raw).await
}

pub async fn audio(
    api_url: &str,
    session: &SessionCredentials,
    file: &Path,
    content_type: Option<&str>,
    raw: bool,
) -> i32 {
    upload_file(api_url, "/v1/audio/uploads", session, "audio", file, content_type, raw).await
}
