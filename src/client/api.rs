use std::sync::Arc;

use reqwest::{header::ACCEPT, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::dto::{AuthResponse, InvitationResponse, LoginRequest, PublicUser, RegisterRequest};
use crate::client::context::{AuthContext, Navigator};
use crate::error::ErrorBody;

/// Shape exposed to views for in-flight data requests.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    /// Nothing to show; also the terminal state of a request whose result
    /// became irrelevant (auth handled globally, or state moved on).
    Idle,
    Loading,
    Data(T),
    Error(ErrorBody),
}

fn transport_error(message: String) -> ErrorBody {
    ErrorBody {
        status_code: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
        error: "Network Error".to_string(),
        message,
    }
}

/// Request executor for the media library API. Every response that is not
/// a success is parsed into the wire envelope; a 401 on a call that
/// expected an authenticated context clears the auth context and navigates
/// to the login view, uniformly, regardless of which operation triggered
/// it. That is what keeps a long-lived open tab consistent with
/// server-side session expiry without polling.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    context: Arc<AuthContext>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        context: Arc<AuthContext>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            context,
            navigator,
        })
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    fn url(&self, slug: &str) -> String {
        format!("{}/api/{}", self.base_url, slug.trim_start_matches('/'))
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        slug: &str,
        body: Option<&B>,
        expects_auth: bool,
    ) -> Result<(StatusCode, Vec<u8>), ErrorBody> {
        let mut request = self
            .http
            .request(method, self.url(slug))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e.to_string()))?
            .to_vec();

        if status.is_success() {
            return Ok((status, bytes));
        }

        // Parse the envelope at the boundary; a non-conforming body still
        // becomes a well-formed error value.
        let error = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_else(|_| ErrorBody {
            status_code: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        });

        if error.is_unauthenticated() && expects_auth {
            warn!(slug, "session rejected by server, forcing logout");
            self.context.clear();
            self.navigator.navigate_to_login();
        }
        Err(error)
    }

    async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        slug: &str,
        body: Option<&B>,
        expects_auth: bool,
    ) -> Result<T, ErrorBody> {
        let (_, bytes) = self.send(method, slug, body, expects_auth).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| transport_error(format!("unexpected response body: {e}")))
    }

    /// GET an authenticated resource.
    pub async fn get<T: DeserializeOwned>(&self, slug: &str) -> Result<T, ErrorBody> {
        self.request_json(Method::GET, slug, None::<&()>, true).await
    }

    /// POST to an authenticated endpoint.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        slug: &str,
        body: &B,
    ) -> Result<T, ErrorBody> {
        self.request_json(Method::POST, slug, Some(body), true).await
    }

    /// DELETE an authenticated resource; the response body is ignored.
    pub async fn delete(&self, slug: &str) -> Result<(), ErrorBody> {
        self.send(Method::DELETE, slug, None::<&()>, true).await?;
        Ok(())
    }

    /// Data-fetch helper for views. Auth failures are already handled
    /// globally by the time this returns, so they surface as `Idle`;
    /// everything else lands in `Error` for local display. A success is
    /// dropped if the auth context transitioned while the request was in
    /// flight.
    pub async fn fetch<T: DeserializeOwned>(&self, slug: &str) -> FetchState<T> {
        let observed = self.context.epoch();
        match self.get::<T>(slug).await {
            Ok(data) if self.context.is_current(observed) => FetchState::Data(data),
            Ok(_) => {
                debug!(slug, "dropping stale response");
                FetchState::Idle
            }
            Err(e) if e.is_unauthenticated() => FetchState::Idle,
            Err(e) => FetchState::Error(e),
        }
    }

    /// Logs in and stores the resulting identity in the auth context.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        stay_logged_in: bool,
    ) -> Result<PublicUser, ErrorBody> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            stay_logged_in,
        };
        // A 401 here means bad credentials, not a lost session; it must
        // not trigger the global redirect.
        let response: AuthResponse = self
            .request_json(Method::POST, "auth/login", Some(&body), false)
            .await?;
        self.context
            .store_login(response.user.clone(), response.artwork_token);
        Ok(response.user)
    }

    /// Registers a new account through an invitation token.
    pub async fn register(
        &self,
        invitation_token: &str,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<PublicUser, ErrorBody> {
        let body = RegisterRequest {
            invitation_token: invitation_token.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
        };
        self.request_json(Method::POST, "auth/register", Some(&body), false)
            .await
    }

    /// Ends the session server-side and clears the local context. The
    /// context is cleared even if the server call fails; from the caller's
    /// perspective logout always leaves the client logged out.
    pub async fn logout(&self) -> Result<(), ErrorBody> {
        let result = self
            .send(Method::POST, "auth/logout", None::<&()>, false)
            .await;
        self.context.clear();
        result.map(|_| ())
    }

    /// Who-am-I probe run once at application start. An anonymous answer
    /// is not an error and must not redirect anywhere.
    pub async fn hydrate(&self) -> Result<Option<PublicUser>, ErrorBody> {
        match self
            .request_json::<AuthResponse, ()>(Method::GET, "auth/user", None, false)
            .await
        {
            Ok(response) => {
                self.context
                    .store_login(response.user.clone(), response.artwork_token);
                Ok(Some(response.user))
            }
            Err(e) if e.is_unauthenticated() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Creates an invitation for a new account.
    pub async fn create_invitation(&self) -> Result<InvitationResponse, ErrorBody> {
        self.request_json(Method::POST, "invitations", None::<&()>, true)
            .await
    }
}
