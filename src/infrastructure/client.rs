use crate::config::{Configuration, Gateway};
use crate::domain::ports::{Client, GatewayRequest, RequestOptions, Transport, TransportResponse};
use crate::error::{ErrorCode, HostedFieldsError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const BRAINTREE_API_VERSION: &str = "2016-08-25";

/// [`Client`] that resolves gateway endpoints from the client configuration and
/// sends them through a [`Transport`].
pub struct GatewayClient {
    configuration: Configuration,
    transport: Arc<dyn Transport>,
}

impl GatewayClient {
    pub fn new(configuration: Configuration, transport: Arc<dyn Transport>) -> Self {
        Self {
            configuration,
            transport,
        }
    }

    fn resolve(&self, request: &GatewayRequest) -> Result<(String, Vec<(String, String)>)> {
        let gateways = &self.configuration.gateway_configuration;
        let endpoint = request.endpoint.trim_start_matches('/');
        match request.api {
            Gateway::ClientApi => Ok((
                format!("{}/v1/{endpoint}", gateways.client_api_url.trim_end_matches('/')),
                Vec::new(),
            )),
            Gateway::BraintreeApi => {
                let api = gateways
                    .braintree_api
                    .as_ref()
                    .ok_or_else(|| HostedFieldsError::new(ErrorCode::ClientGatewayUnavailable))?;
                Ok((
                    format!("{}/{endpoint}", api.url.trim_end_matches('/')),
                    vec![
                        (
                            "Authorization".to_string(),
                            format!("Bearer {}", api.access_token),
                        ),
                        (
                            "Braintree-Version".to_string(),
                            BRAINTREE_API_VERSION.to_string(),
                        ),
                    ],
                ))
            }
        }
    }

    fn with_metadata(&self, mut data: Value) -> Value {
        if let Value::Object(map) = &mut data {
            let meta = map.entry("_meta").or_insert_with(|| json!({}));
            if let (Value::Object(meta), Value::Object(analytics)) =
                (meta, &self.configuration.analytics_metadata)
            {
                for (key, value) in analytics {
                    meta.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        data
    }
}

/// Maps a raw transport outcome onto the client error codes.
pub fn interpret(response: TransportResponse) -> Result<Value> {
    let TransportResponse {
        status,
        body,
        error,
    } = response;

    let failure = |code: ErrorCode| {
        HostedFieldsError::new(code)
            .with_status(status)
            .with_body(body.clone())
    };

    match status {
        -1 | 0 => Err(failure(ErrorCode::ClientRequestTimeout)),
        429 => Err(failure(ErrorCode::ClientRateLimited)),
        403 => Err(failure(ErrorCode::ClientAuthorizationInsufficient)),
        status if status >= 500 => Err(failure(ErrorCode::ClientGatewayNetwork)),
        status if !(200..400).contains(&status) => Err(failure(ErrorCode::ClientRequestError)),
        _ => match error {
            Some(message) => Err(failure(ErrorCode::ClientGatewayNetwork).with_message(message)),
            None => Ok(body),
        },
    }
}

#[async_trait]
impl Client for GatewayClient {
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn request(&self, request: GatewayRequest) -> Result<Value> {
        let (url, headers) = self.resolve(&request)?;
        let timeout = request.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let options = RequestOptions {
            url,
            method: request.method,
            data: self.with_metadata(request.data),
            headers,
            timeout,
        };

        debug!(api = ?request.api, url = %options.url, "Sending gateway request");
        let response = match tokio::time::timeout(timeout, self.transport.request(options)).await {
            Ok(response) => response,
            Err(_) => TransportResponse::timed_out(),
        };
        interpret(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BraintreeApiConfiguration;
    use crate::domain::ports::Method;
    use parking_lot::Mutex;

    struct Recording {
        seen: Mutex<Vec<RequestOptions>>,
        response: TransportResponse,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn request(&self, options: RequestOptions) -> TransportResponse {
            self.seen.lock().push(options);
            self.response.clone()
        }
    }

    fn request(api: Gateway, endpoint: &str) -> GatewayRequest {
        GatewayRequest {
            api,
            method: Method::Post,
            endpoint: endpoint.to_string(),
            data: json!({ "creditCard": {} }),
            timeout: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        let code = |status| interpret(TransportResponse::status(status, json!({}))).unwrap_err().code;
        assert_eq!(code(0), ErrorCode::ClientRequestTimeout);
        assert_eq!(code(-1), ErrorCode::ClientRequestTimeout);
        assert_eq!(code(429), ErrorCode::ClientRateLimited);
        assert_eq!(code(403), ErrorCode::ClientAuthorizationInsufficient);
        assert_eq!(code(502), ErrorCode::ClientGatewayNetwork);
        assert_eq!(code(422), ErrorCode::ClientRequestError);
        assert_eq!(code(199), ErrorCode::ClientRequestError);
        assert!(interpret(TransportResponse::status(201, json!({ "ok": true }))).is_ok());
    }

    #[test]
    fn test_request_error_keeps_body() {
        let body = json!({ "fieldErrors": [] });
        let err = interpret(TransportResponse::status(422, body.clone())).unwrap_err();
        assert_eq!(err.details.body, Some(body));
        assert_eq!(err.http_status(), Some(422));
    }

    #[tokio::test]
    async fn test_urls_and_headers() {
        let transport = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            response: TransportResponse::ok(json!({})),
        });
        let mut configuration = Configuration::new("https://api.example/merchants/m/client_api/");
        configuration.analytics_metadata = json!({ "sessionId": "abc" });
        configuration.gateway_configuration.braintree_api = Some(BraintreeApiConfiguration {
            url: "https://payments.example".into(),
            access_token: "secret".into(),
        });
        let client = GatewayClient::new(configuration, transport.clone());

        client
            .request(request(Gateway::ClientApi, "payment_methods/credit_cards"))
            .await
            .unwrap();
        client.request(request(Gateway::BraintreeApi, "/tokens")).await.unwrap();

        let seen = transport.seen.lock();
        assert_eq!(
            seen[0].url,
            "https://api.example/merchants/m/client_api/v1/payment_methods/credit_cards"
        );
        assert_eq!(seen[0].data["_meta"]["sessionId"], "abc");
        assert_eq!(seen[1].url, "https://payments.example/tokens");
        assert!(
            seen[1]
                .headers
                .contains(&("Authorization".to_string(), "Bearer secret".to_string()))
        );
    }

    #[tokio::test]
    async fn test_missing_secondary_gateway() {
        let transport = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            response: TransportResponse::ok(json!({})),
        });
        let client = GatewayClient::new(Configuration::new("https://api.example"), transport);
        let err = client
            .request(request(Gateway::BraintreeApi, "tokens"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientGatewayUnavailable);
    }
}
