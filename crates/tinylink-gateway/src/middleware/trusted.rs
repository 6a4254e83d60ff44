use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::subnet::client_ip_from_headers;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

/// Lets the request through only when the proxy-reported client address
/// lies inside the configured trusted subnet. Without a subnet every caller
/// is refused.
pub async fn trusted_subnet_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let Some(subnet) = state.trusted_subnet() else {
        debug!("no trusted subnet configured");
        return Err(AppError::Forbidden);
    };

    match client_ip_from_headers(request.headers()) {
        Some(ip) if subnet.contains(ip) => Ok(next.run(request).await),
        ip => {
            debug!(client_ip = ?ip, subnet = %subnet, "caller outside trusted subnet");
            Err(AppError::Forbidden)
        }
    }
}
