//! The two interchangeable JSON-RPC transports (Streamable HTTP and SSE)
//! plus the strategy that selects and falls back between them.

mod error;
mod http;
mod selector;
mod sse;
mod trait_def;

pub use error::{Result, TransportError};
pub use http::HttpTransport;
pub use selector::{TransportKind, TransportStrategy};
pub use sse::SseTransport;
pub use trait_def::{DynTransport, Transport};

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfuse_protocol::{Message, RequestId};
    use reqwest::Client;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_transport_start_succeeds_on_2xx_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            server.uri().parse().unwrap(),
            Client::new(),
            HashMap::new(),
            None,
        );
        transport.start().await.unwrap();
    }

    #[tokio::test]
    async fn http_transport_start_classifies_404_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            server.uri().parse().unwrap(),
            Client::new(),
            HashMap::new(),
            None,
        );
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound));
    }

    #[tokio::test]
    async fn http_transport_send_receive_round_trips_a_response() {
        let server = MockServer::start().await;
        let response = Message::success(RequestId::Number(1), serde_json::json!({"tools": []}));
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            server.uri().parse().unwrap(),
            Client::new(),
            HashMap::new(),
            None,
        );
        let request = Message::request(RequestId::Number(1), "tools/list", None);
        let reply = transport.send_receive(request).await.unwrap();
        assert_eq!(reply.id, Some(RequestId::Number(1)));
    }

    #[tokio::test]
    async fn sse_transport_starts_after_endpoint_event_and_round_trips() {
        let server = MockServer::start().await;

        let body = "event: endpoint\ndata: /messages/abc\n\n";
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream")
                    .append_header("Content-Type", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let response = Message::success(RequestId::Number(7), serde_json::json!({"ok": true}));
        Mock::given(method("POST"))
            .and(path("/messages/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response))
            .mount(&server)
            .await;

        let transport = SseTransport::new(
            server.uri().parse().unwrap(),
            Client::new(),
            HashMap::new(),
            None,
        );
        transport.start().await.unwrap();

        let request = Message::request(RequestId::Number(7), "tools/list", None);
        let reply = transport.send_receive(request).await.unwrap();
        assert_eq!(reply.id, Some(RequestId::Number(7)));

        transport.close().await;
    }
}
