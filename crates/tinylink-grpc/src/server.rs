use crate::error::GrpcError;
use std::sync::Arc;
use tinylink_core::{Resolution, ShortCode, Shortened, Shortener, UserId};
use tinylink_gateway::subnet::{client_ip, FORWARDED_FOR_HEADER, REAL_IP_HEADER};
use tinylink_gateway::TrustedSubnet;
use tinylink_proto_schema::v1 as proto;
use tinylink_proto_schema::v1::shortener_service_server::ShortenerService;
use tinylink_session::{Session, SessionResolver, SESSION_COOKIE};
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

pub struct ShortenerGrpcServer {
    shortener: Arc<dyn Shortener>,
    sessions: SessionResolver,
    base_url: String,
    trusted_subnet: Option<TrustedSubnet>,
}

impl ShortenerGrpcServer {
    pub fn new(
        shortener: Arc<dyn Shortener>,
        sessions: SessionResolver,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            shortener,
            sessions,
            base_url: base_url.trim_end_matches('/').to_string(),
            trusted_subnet: None,
        }
    }

    pub fn with_trusted_subnet(mut self, subnet: Option<TrustedSubnet>) -> Self {
        self.trusted_subnet = subnet;
        self
    }

    fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }

    async fn session(&self, metadata: &MetadataMap) -> Result<Session, Status> {
        let token = metadata.get(SESSION_COOKIE).and_then(|v| v.to_str().ok());
        self.sessions
            .resolve(token)
            .await
            .map_err(|e| GrpcError::from(e).into())
    }

    fn is_trusted<T>(&self, request: &Request<T>) -> bool {
        let Some(subnet) = self.trusted_subnet else {
            return false;
        };
        let metadata = request.metadata();
        let header = |name: &str| metadata.get(name).and_then(|v| v.to_str().ok());
        let ip = client_ip(header(REAL_IP_HEADER), header(FORWARDED_FOR_HEADER))
            .or_else(|| request.remote_addr().map(|addr| addr.ip()));

        debug!(client_ip = ?ip, subnet = %subnet, "checking statistics caller");
        ip.is_some_and(|ip| subnet.contains(ip))
    }
}

/// Hands a freshly minted session token back in the response metadata,
/// on success and failure alike.
fn finish<T>(session: &Session, result: Result<T, GrpcError>) -> Result<Response<T>, Status> {
    let token = session
        .issued_token
        .as_deref()
        .and_then(|token| match MetadataValue::try_from(token) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "session token is not valid metadata");
                None
            }
        });

    match result {
        Ok(message) => {
            let mut response = Response::new(message);
            if let Some(token) = token {
                response.metadata_mut().insert(SESSION_COOKIE, token);
            }
            Ok(response)
        }
        Err(error) => {
            let mut status = Status::from(error);
            if let Some(token) = token {
                status.metadata_mut().insert(SESSION_COOKIE, token);
            }
            Err(status)
        }
    }
}

impl ShortenerGrpcServer {
    async fn create_for(
        &self,
        user: &UserId,
        request: proto::CreateRequest,
    ) -> Result<proto::CreateResponse, GrpcError> {
        match self
            .shortener
            .shorten(user, request.original_url.trim())
            .await?
        {
            Shortened::Created(code) => Ok(proto::CreateResponse {
                short_url: self.short_url(&code),
                short_code: code.to_string(),
            }),
            Shortened::Existing(code) => Err(GrpcError::AlreadyExists(self.short_url(&code))),
        }
    }

    async fn create_batch_for(
        &self,
        user: &UserId,
        request: proto::CreateBatchRequest,
    ) -> Result<proto::CreateBatchResponse, GrpcError> {
        let urls: Vec<String> = request
            .items
            .iter()
            .map(|item| item.original_url.trim().to_string())
            .collect();
        let codes = self.shortener.shorten_batch(user, &urls).await?;

        let items = request
            .items
            .into_iter()
            .zip(codes)
            .map(|(item, code)| proto::BatchResult {
                correlation_id: item.correlation_id,
                short_url: self.short_url(&code),
            })
            .collect();
        Ok(proto::CreateBatchResponse { items })
    }

    async fn list_for(&self, user: &UserId) -> Result<proto::ListUrlsResponse, GrpcError> {
        let urls = self
            .shortener
            .list(user)
            .await?
            .into_iter()
            .map(|(code, original_url)| proto::UserUrl {
                short_url: self.short_url(&code),
                original_url,
            })
            .collect();
        Ok(proto::ListUrlsResponse { urls })
    }

    async fn delete_for(
        &self,
        user: &UserId,
        request: proto::DeleteUrlsRequest,
    ) -> Result<proto::DeleteUrlsResponse, GrpcError> {
        let codes = request.codes()?;
        self.shortener.delete(user, codes).await?;
        Ok(proto::DeleteUrlsResponse {})
    }
}

#[tonic::async_trait]
impl ShortenerService for ShortenerGrpcServer {
    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> Result<Response<proto::CreateResponse>, Status> {
        let session = self.session(request.metadata()).await?;
        let result = self.create_for(&session.user_id, request.into_inner()).await;
        finish(&session, result)
    }

    async fn create_batch(
        &self,
        request: Request<proto::CreateBatchRequest>,
    ) -> Result<Response<proto::CreateBatchResponse>, Status> {
        let session = self.session(request.metadata()).await?;
        let result = self
            .create_batch_for(&session.user_id, request.into_inner())
            .await;
        finish(&session, result)
    }

    async fn resolve(
        &self,
        request: Request<proto::ResolveRequest>,
    ) -> Result<Response<proto::ResolveResponse>, Status> {
        let code = ShortCode::try_from(request.get_ref()).map_err(GrpcError::from)?;

        match self.shortener.resolve(&code).await.map_err(GrpcError::from)? {
            Resolution::Active(original_url) => {
                Ok(Response::new(proto::ResolveResponse { original_url }))
            }
            Resolution::Deleted => Err(GrpcError::Deleted.into()),
            Resolution::Missing => Err(GrpcError::NotFound.into()),
        }
    }

    async fn list_urls(
        &self,
        request: Request<proto::ListUrlsRequest>,
    ) -> Result<Response<proto::ListUrlsResponse>, Status> {
        let session = self.session(request.metadata()).await?;
        let result = self.list_for(&session.user_id).await;
        finish(&session, result)
    }

    async fn delete_urls(
        &self,
        request: Request<proto::DeleteUrlsRequest>,
    ) -> Result<Response<proto::DeleteUrlsResponse>, Status> {
        let session = self.session(request.metadata()).await?;
        let result = self.delete_for(&session.user_id, request.into_inner()).await;
        finish(&session, result)
    }

    async fn ping(
        &self,
        _request: Request<proto::PingRequest>,
    ) -> Result<Response<proto::PingResponse>, Status> {
        self.shortener.ping().await.map_err(GrpcError::from)?;
        Ok(Response::new(proto::PingResponse {}))
    }

    async fn statistics(
        &self,
        request: Request<proto::StatisticsRequest>,
    ) -> Result<Response<proto::StatisticsResponse>, Status> {
        if !self.is_trusted(&request) {
            return Err(GrpcError::PermissionDenied.into());
        }
        let stats = self.shortener.statistics().await.map_err(GrpcError::from)?;
        Ok(Response::new(stats.into()))
    }
}
