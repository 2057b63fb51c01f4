//! `test-utils` is used for testing in both `apiqueue-lib` and `apiqueue-bin`.
//! This crate does not depend on `apiqueue-lib` or `apiqueue-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies
//! (`wiremock` and `http`).

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock API which rejects the first `$rejections` requests with
/// `429 Too Many Requests` and a `Retry-After` of `$retry_after` seconds,
/// then answers every request with `200 OK` and an empty JSON object
#[macro_export]
macro_rules! rate_limited_mock_server {
    ($rejections:expr, $retry_after:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(
                wiremock::ResponseTemplate::new(http::StatusCode::TOO_MANY_REQUESTS)
                    .insert_header("retry-after", $retry_after.to_string().as_str()),
            )
            .up_to_n_times($rejections)
            .with_priority(1)
            .mount(&mock_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(
                wiremock::ResponseTemplate::new(http::StatusCode::OK).set_body_string("{}"),
            )
            .with_priority(2)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock API serving `$body` as JSON for `GET $path`
#[macro_export]
macro_rules! json_mock_server {
    ($path:expr, $body:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path($path))
            .respond_with(
                wiremock::ResponseTemplate::new(http::StatusCode::OK)
                    .insert_header("content-type", "application/json")
                    .set_body_string($body),
            )
            .mount(&mock_server)
            .await;
        mock_server
    }};
}
