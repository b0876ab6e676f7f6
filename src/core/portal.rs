//! Captive portal detection and automated login
//!
//! Runs once per successful join, in its own task, and never feeds back
//! into the connection state machine. Detection works from interception
//! signals: a redirect on a probe URL, an HTTP 200 where 204 is expected,
//! or an oversized body on an endpoint known to answer with a tiny page.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trait_variant::make;

use crate::core::error::{PortalError, PortalResult};

/// Credentials and network identity for one login attempt.
///
/// Owned by the login task; destroyed when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSession {
    pub ssid: String,
    pub username: String,
    pub password: String,
    /// Default gateway of the joined network, the last-resort login host
    pub gateway: Option<Ipv4Addr>,
}

/// One detection endpoint
#[derive(Debug, Clone)]
pub struct ProbeEndpoint {
    /// URL fetched with redirects disabled
    pub url: String,
    /// Hostname resolved when interception is suspected
    pub host: String,
    /// The endpoint normally answers 204, so a plain 200 is a hijack
    pub treat_200_as_hijack: bool,
}

/// Where and how to probe for interception.
///
/// The detection algorithm and its priority order are fixed; the
/// endpoints, SSID patterns and pinned URLs are deployment policy.
#[derive(Debug, Clone)]
pub struct PortalPolicy {
    /// Probed in order; the first strategy yielding a login URL wins
    pub probes: Vec<ProbeEndpoint>,
    /// 200 bodies at least this large count as injected portal pages
    pub small_body_limit: u64,
    /// SSID substrings that get the fallback treatment even without a
    /// hijack signal
    pub fallback_ssid_patterns: Vec<String>,
    /// Hardwired login URLs for recognized SSIDs
    pub pinned_logins: Vec<(String, String)>,
    pub probe_timeout: Duration,
    pub login_timeout: Duration,
}

impl Default for PortalPolicy {
    fn default() -> Self {
        Self {
            probes: vec![
                ProbeEndpoint {
                    url: "http://connect.rom.miui.com/generate_204".into(),
                    host: "connect.rom.miui.com".into(),
                    treat_200_as_hijack: true,
                },
                ProbeEndpoint {
                    url: "http://captive.apple.com/".into(),
                    host: "captive.apple.com".into(),
                    treat_200_as_hijack: false,
                },
            ],
            small_body_limit: 200,
            fallback_ssid_patterns: vec!["BUPT".into()],
            pinned_logins: vec![
                ("BUPT-portal".into(), "http://10.3.8.216/login".into()),
                ("BUPT-mobile".into(), "http://10.3.8.216/login".into()),
            ],
            probe_timeout: Duration::from_secs(5),
            login_timeout: Duration::from_secs(8),
        }
    }
}

/// What a probe request came back with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub status: u16,
    pub location: Option<String>,
    pub content_length: Option<u64>,
}

/// HTTP and DNS operations the engine needs, behind a seam so tests can
/// script portal behavior without a network.
#[make(Send)]
pub trait PortalHttp: Sync + 'static {
    /// GET the URL without following redirects
    async fn probe(&self, url: &str, timeout: Duration) -> PortalResult<ProbeReply>;

    /// POST a form-urlencoded body, returning the HTTP status
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> PortalResult<u16>;

    /// Resolve a hostname to its first IPv4 address
    async fn resolve(&self, host: &str) -> PortalResult<Option<Ipv4Addr>>;
}

const PORTAL_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Production [`PortalHttp`] backed by `reqwest`
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> PortalResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PortalError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PortalHttp for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> PortalResult<ProbeReply> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PortalError::Transport(e.to_string()))?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Ok(ProbeReply {
            status: response.status().as_u16(),
            location,
            content_length: response.content_length(),
        })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> PortalResult<u16> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, PORTAL_USER_AGENT)
            .form(form)
            .send()
            .await
            .map_err(|e| PortalError::Transport(e.to_string()))?;

        Ok(response.status().as_u16())
    }

    async fn resolve(&self, host: &str) -> PortalResult<Option<Ipv4Addr>> {
        let addrs = tokio::net::lookup_host((host, 80))
            .await
            .map_err(|e| PortalError::Resolve(format!("{host}: {e}")))?;

        Ok(addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next())
    }
}

/// Result of one engine run, for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalOutcome {
    /// No interception detected; connectivity assumed sufficient as-is
    NoPortal,
    /// A login URL was found and the credential POST returned this status
    LoginAttempted { url: String, status: u16 },
    /// A login URL was found but the POST could not be delivered
    LoginFailed { url: String },
}

enum Detection {
    /// A concrete login URL was determined
    Login(String),
    /// Interception observed but no URL could be derived
    Hijack,
    /// Clean response or probe failure
    None,
}

/// Spawn the engine as an independent background task
pub(crate) fn spawn<H>(
    http: Arc<H>,
    policy: PortalPolicy,
    session: PortalSession,
) -> JoinHandle<PortalOutcome>
where
    H: PortalHttp + Send,
{
    tokio::spawn(async move { run_login(http.as_ref(), &policy, &session).await })
}

/// Run the detection chain and, if a login URL surfaces, POST the
/// session credentials to it. Single best-effort attempt per join.
pub async fn run_login<H: PortalHttp>(
    http: &H,
    policy: &PortalPolicy,
    session: &PortalSession,
) -> PortalOutcome {
    let mut hijack_seen = false;
    let mut login_url = None;

    for probe in &policy.probes {
        match inspect_probe(http, policy, probe).await {
            Detection::Login(url) => {
                login_url = Some(url);
                break;
            }
            Detection::Hijack => hijack_seen = true,
            Detection::None => {}
        }
    }

    if login_url.is_none() {
        let ssid_match = policy
            .fallback_ssid_patterns
            .iter()
            .any(|pattern| session.ssid.contains(pattern.as_str()));

        if hijack_seen || ssid_match {
            login_url = policy
                .pinned_logins
                .iter()
                .find(|(ssid, _)| *ssid == session.ssid)
                .map(|(_, url)| url.clone())
                .or_else(|| session.gateway.map(|gw| format!("http://{gw}/login")));
        }
    }

    let Some(url) = login_url else {
        debug!(ssid = %session.ssid, "no captive portal detected");
        return PortalOutcome::NoPortal;
    };

    let url = normalize_login_url(&url);
    info!(%url, ssid = %session.ssid, "attempting captive portal login");

    let form = [
        ("user", session.username.as_str()),
        ("pass", session.password.as_str()),
    ];
    match http.post_form(&url, &form, policy.login_timeout).await {
        Ok(status) => {
            info!(%url, status, "portal login response");
            PortalOutcome::LoginAttempted { url, status }
        }
        Err(e) => {
            warn!(%url, error = %e, "portal login request failed");
            PortalOutcome::LoginFailed { url }
        }
    }
}

async fn inspect_probe<H: PortalHttp>(
    http: &H,
    policy: &PortalPolicy,
    probe: &ProbeEndpoint,
) -> Detection {
    let reply = match http.probe(&probe.url, policy.probe_timeout).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(url = %probe.url, error = %e, "probe failed");
            return Detection::None;
        }
    };
    debug!(url = %probe.url, status = reply.status, "probe response");

    match reply.status {
        301 | 302 => match reply.location {
            Some(location) => Detection::Login(location),
            None => Detection::None,
        },
        200 => {
            let small_body = reply
                .content_length
                .is_some_and(|len| len > 0 && len < policy.small_body_limit);
            if !probe.treat_200_as_hijack && small_body {
                // Tiny canonical body: genuinely online, nothing injected
                return Detection::None;
            }

            // Interception confirmed. A portal that hijacks DNS resolves
            // the probe host to an address inside the local network; that
            // address doubles as the login host.
            match http.resolve(&probe.host).await {
                Ok(Some(ip)) if ip.is_private() => {
                    Detection::Login(format!("http://{ip}/login"))
                }
                Ok(resolved) => {
                    debug!(host = %probe.host, ?resolved, "hijack without usable address");
                    Detection::Hijack
                }
                Err(e) => {
                    debug!(host = %probe.host, error = %e, "hijack but resolution failed");
                    Detection::Hijack
                }
            }
        }
        _ => Detection::None,
    }
}

/// Ensure the URL targets a `/login` path segment
fn normalize_login_url(url: &str) -> String {
    if url.contains("login") {
        url.to_string()
    } else {
        format!("{}/login", url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted [`PortalHttp`]: replies per URL, records POSTs
    #[derive(Default)]
    struct ScriptedHttp {
        replies: HashMap<String, ProbeReply>,
        resolved: HashMap<String, Ipv4Addr>,
        posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
        post_status: u16,
    }

    impl ScriptedHttp {
        fn new() -> Self {
            Self {
                post_status: 200,
                ..Default::default()
            }
        }

        fn reply(mut self, url: &str, status: u16, location: Option<&str>, len: Option<u64>) -> Self {
            self.replies.insert(
                url.into(),
                ProbeReply {
                    status,
                    location: location.map(str::to_owned),
                    content_length: len,
                },
            );
            self
        }

        fn resolves(mut self, host: &str, ip: [u8; 4]) -> Self {
            self.resolved.insert(host.into(), Ipv4Addr::from(ip));
            self
        }

        fn posts(&self) -> Vec<(String, Vec<(String, String)>)> {
            self.posts.lock().unwrap().clone()
        }
    }

    impl PortalHttp for ScriptedHttp {
        async fn probe(&self, url: &str, _timeout: Duration) -> PortalResult<ProbeReply> {
            self.replies
                .get(url)
                .cloned()
                .ok_or_else(|| PortalError::Transport(format!("unreachable: {url}")))
        }

        async fn post_form(
            &self,
            url: &str,
            form: &[(&str, &str)],
            _timeout: Duration,
        ) -> PortalResult<u16> {
            self.posts.lock().unwrap().push((
                url.to_string(),
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            Ok(self.post_status)
        }

        async fn resolve(&self, host: &str) -> PortalResult<Option<Ipv4Addr>> {
            Ok(self.resolved.get(host).copied())
        }
    }

    fn session(ssid: &str, gateway: Option<[u8; 4]>) -> PortalSession {
        PortalSession {
            ssid: ssid.into(),
            username: "guest".into(),
            password: "secret".into(),
            gateway: gateway.map(Ipv4Addr::from),
        }
    }

    const PROBE_204: &str = "http://connect.rom.miui.com/generate_204";
    const PROBE_BODY: &str = "http://captive.apple.com/";

    #[tokio::test]
    async fn test_redirect_yields_login_url() {
        let http = ScriptedHttp::new().reply(
            PROBE_204,
            302,
            Some("http://portal.example.net/auth/login?src=probe"),
            None,
        );

        let outcome = run_login(&http, &PortalPolicy::default(), &session("Hotel", None)).await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://portal.example.net/auth/login?src=probe".into(),
                status: 200
            }
        );
        let posts = http.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].1,
            vec![
                ("user".to_string(), "guest".to_string()),
                ("pass".to_string(), "secret".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_hijacked_204_with_private_dns_synthesizes_login() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 200, None, Some(3000))
            .resolves("connect.rom.miui.com", [192, 168, 1, 1]);

        let outcome = run_login(&http, &PortalPolicy::default(), &session("CafeWifi", None)).await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://192.168.1.1/login".into(),
                status: 200
            }
        );
        assert_eq!(http.posts()[0].0, "http://192.168.1.1/login");
    }

    #[tokio::test]
    async fn test_small_body_success_means_no_portal() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 204, None, None)
            .reply(PROBE_BODY, 200, None, Some(68));

        let outcome = run_login(&http, &PortalPolicy::default(), &session("HomeNet", None)).await;
        assert_eq!(outcome, PortalOutcome::NoPortal);
        assert!(http.posts().is_empty());
    }

    #[tokio::test]
    async fn test_large_body_hijack_with_private_dns() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 204, None, None)
            .reply(PROBE_BODY, 200, None, Some(15_000))
            .resolves("captive.apple.com", [10, 20, 0, 1]);

        let outcome = run_login(&http, &PortalPolicy::default(), &session("Hotel", None)).await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://10.20.0.1/login".into(),
                status: 200
            }
        );
    }

    #[tokio::test]
    async fn test_public_dns_hijack_falls_back_to_gateway() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 200, None, Some(5000))
            .resolves("connect.rom.miui.com", [93, 184, 216, 34])
            .reply(PROBE_BODY, 200, None, Some(5000))
            .resolves("captive.apple.com", [93, 184, 216, 34]);

        let outcome = run_login(
            &http,
            &PortalPolicy::default(),
            &session("Hotel", Some([172, 16, 0, 1])),
        )
        .await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://172.16.0.1/login".into(),
                status: 200
            }
        );
    }

    #[tokio::test]
    async fn test_pinned_login_for_recognized_ssid() {
        // No probe answers at all, but the SSID pattern forces fallback
        let http = ScriptedHttp::new();

        let outcome = run_login(
            &http,
            &PortalPolicy::default(),
            &session("BUPT-portal", Some([10, 0, 0, 1])),
        )
        .await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://10.3.8.216/login".into(),
                status: 200
            }
        );
    }

    #[tokio::test]
    async fn test_ssid_pattern_without_pin_uses_gateway() {
        let http = ScriptedHttp::new();

        let outcome = run_login(
            &http,
            &PortalPolicy::default(),
            &session("BUPT-library", Some([10, 3, 0, 254])),
        )
        .await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://10.3.0.254/login".into(),
                status: 200
            }
        );
    }

    #[tokio::test]
    async fn test_quiet_exit_without_any_signal() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 204, None, None)
            .reply(PROBE_BODY, 200, None, Some(50));

        let outcome = run_login(
            &http,
            &PortalPolicy::default(),
            &session("HomeNet", Some([192, 168, 0, 1])),
        )
        .await;
        // Gateway is known but unused: no hijack, no pattern match
        assert_eq!(outcome, PortalOutcome::NoPortal);
    }

    #[tokio::test]
    async fn test_hijack_without_gateway_or_pin_gives_up() {
        let http = ScriptedHttp::new()
            .reply(PROBE_204, 200, None, Some(5000))
            .reply(PROBE_BODY, 200, None, Some(5000));

        let outcome = run_login(&http, &PortalPolicy::default(), &session("Hotel", None)).await;
        assert_eq!(outcome, PortalOutcome::NoPortal);
        assert!(http.posts().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_location_gets_login_suffix() {
        let http = ScriptedHttp::new().reply(PROBE_204, 302, Some("http://10.1.1.1/"), None);

        let outcome = run_login(&http, &PortalPolicy::default(), &session("Hotel", None)).await;
        assert_eq!(
            outcome,
            PortalOutcome::LoginAttempted {
                url: "http://10.1.1.1/login".into(),
                status: 200
            }
        );
    }

    #[test]
    fn test_normalize_login_url() {
        assert_eq!(
            normalize_login_url("http://10.0.0.1/login"),
            "http://10.0.0.1/login"
        );
        assert_eq!(
            normalize_login_url("http://10.0.0.1/"),
            "http://10.0.0.1/login"
        );
        assert_eq!(
            normalize_login_url("http://10.0.0.1"),
            "http://10.0.0.1/login"
        );
        assert_eq!(
            normalize_login_url("http://p.example/weblogin?next=/"),
            "http://p.example/weblogin?next=/"
        );
    }
}
