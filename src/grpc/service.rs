//! Thin tonic adapter: translates the wire `RateLimitRequest`/`Response`
//! into the transport-independent [`RateLimitService`] facade types and
//! back. Holds no rate-limiting logic of its own.

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use super::proto::envoy::service::ratelimit::v3::rate_limit_response::{
    Code, DescriptorStatus as ProtoDescriptorStatus, RateLimit as ProtoRateLimit,
};
use super::proto::envoy::service::ratelimit::v3::{
    rate_limit_service_server::RateLimitService as RateLimitServiceTrait, RateLimitRequest,
    RateLimitResponse,
};

use crate::error::{RateLimitError, ServiceError};
use crate::ratelimit::evaluator::{DescriptorStatus, Verdict};
use crate::ratelimit::model::TimeUnit;
use crate::service::{RateLimitService, RateLimitServiceRequest};

pub struct RateLimitServiceImpl {
    service: RateLimitService,
}

impl RateLimitServiceImpl {
    pub fn new(service: RateLimitService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl RateLimitServiceTrait for RateLimitServiceImpl {
    #[instrument(
        skip(self, request),
        fields(
            domain = %request.get_ref().domain,
            descriptor_count = request.get_ref().descriptors.len(),
            hits_addend = request.get_ref().hits_addend
        )
    )]
    async fn should_rate_limit(
        &self,
        request: Request<RateLimitRequest>,
    ) -> Result<Response<RateLimitResponse>, Status> {
        let req = request.into_inner();

        let descriptors = req
            .descriptors
            .iter()
            .map(|d| d.entries.iter().map(|e| (e.key.clone(), e.value.clone())).collect())
            .collect();

        let service_request = RateLimitServiceRequest {
            domain: req.domain,
            descriptors,
            hits_addend: req.hits_addend,
        };

        match self.service.should_rate_limit(service_request).await {
            Ok(response) => {
                let overall_code = match response.overall {
                    Verdict::Ok => Code::Ok,
                    Verdict::OverLimit => Code::OverLimit,
                };

                info!(overall_code = ?overall_code, "rate limit decision made");

                Ok(Response::new(RateLimitResponse {
                    overall_code: overall_code.into(),
                    statuses: response.statuses.iter().map(to_proto_status).collect(),
                    response_headers_to_add: Vec::new(),
                    request_headers_to_add: Vec::new(),
                    raw_body: Vec::new(),
                    dynamic_metadata: None,
                }))
            }
            Err(e) => {
                warn!(error = %e, "rate limit request rejected");
                Err(to_status(e))
            }
        }
    }
}

fn to_proto_status(status: &DescriptorStatus) -> ProtoDescriptorStatus {
    let code = match status.verdict {
        Verdict::Ok => Code::Ok,
        Verdict::OverLimit => Code::OverLimit,
    };

    let current_limit = status.limit.as_ref().map(|limit| ProtoRateLimit {
        name: limit.name.clone().unwrap_or_default(),
        requests_per_unit: limit.requests_per_unit as u32,
        unit: time_unit_to_proto(limit.unit),
    });

    ProtoDescriptorStatus {
        code: code.into(),
        current_limit,
        limit_remaining: status.limit_remaining,
        duration_until_reset: Some(prost_types::Duration {
            seconds: status.duration_until_reset.as_secs() as i64,
            nanos: 0,
        }),
    }
}

fn time_unit_to_proto(unit: TimeUnit) -> i32 {
    unit.to_proto()
}

fn to_status(err: RateLimitError) -> Status {
    match err {
        RateLimitError::Service(ServiceError::EmptyDomain) => Status::invalid_argument("domain is required"),
        RateLimitError::Service(ServiceError::EmptyDescriptors) => {
            Status::invalid_argument("at least one descriptor is required")
        }
        RateLimitError::Service(ServiceError::NoConfiguration) => {
            Status::unavailable("no rate limit configuration loaded")
        }
        RateLimitError::Backend(e) => Status::unavailable(format!("counter store unavailable: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::{
        rate_limit_descriptor::Entry, RateLimitDescriptor,
    };
    use crate::ratelimit::clock::FixedClock;
    use crate::ratelimit::loader;
    use crate::ratelimit::store::{CounterStoreRouter, InMemoryCounterStore};
    use crate::service::publish_configuration;

    fn service() -> RateLimitServiceImpl {
        let store = CounterStoreRouter::new(Arc::new(InMemoryCounterStore::new()));
        let inner = RateLimitService::new(store, Arc::new(FixedClock(1_000)), false);

        let config = loader::load(&[(
            "t.yaml".to_string(),
            "domain: test\ndescriptors:\n  - key: test_key\n    rate_limit:\n      requests_per_unit: 1\n      unit: second\n".to_string(),
        )])
        .unwrap();
        publish_configuration(&inner.config_handle(), config);

        RateLimitServiceImpl::new(inner)
    }

    #[tokio::test]
    async fn empty_domain_rejected() {
        let service = service();
        let request = Request::new(RateLimitRequest {
            domain: String::new(),
            descriptors: vec![RateLimitDescriptor {
                entries: vec![Entry {
                    key: "test".to_string(),
                    value: "value".to_string(),
                }],
                limit: None,
            }],
            hits_addend: 1,
        });

        let result = service.should_rate_limit(request).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn empty_descriptors_rejected() {
        let service = service();
        let request = Request::new(RateLimitRequest {
            domain: "test".to_string(),
            descriptors: vec![],
            hits_addend: 1,
        });

        let result = service.should_rate_limit(request).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn valid_request_returns_ok() {
        let service = service();
        let request = Request::new(RateLimitRequest {
            domain: "test".to_string(),
            descriptors: vec![RateLimitDescriptor {
                entries: vec![Entry {
                    key: "test_key".to_string(),
                    value: "test_value".to_string(),
                }],
                limit: None,
            }],
            hits_addend: 1,
        });

        let result = service.should_rate_limit(request).await;
        assert!(result.is_ok());

        let response = result.unwrap().into_inner();
        assert_eq!(response.overall_code, i32::from(Code::Ok));
        assert_eq!(response.statuses.len(), 1);
    }
}
