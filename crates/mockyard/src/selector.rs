//! Response selection.
//!
//! Precedence, highest first: the response's `blockProxy`, the server's
//! `forceProxy`, then the mock itself. A preset override replaces the route's
//! `activeResponseId` for the lifetime of the override only.

use crate::matcher::RouteMatch;
use crate::project::{MockResponse, PresetOverrides, ProjectServer, ResponseKind, RouteResponse};

/// What the pipeline should do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Mock {
        response: &'a RouteResponse,
        body: MockBody<'a>,
        from_preset: bool,
    },
    Proxy {
        base_url: String,
        response_id: Option<&'a str>,
        from_preset: bool,
    },
    /// A route matched but its configuration can't produce a response.
    Misconfigured {
        response_id: Option<String>,
        reason: String,
    },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBody<'a> {
    Static(&'a MockResponse),
    Script(&'a str),
}

/// Resolve a (possibly absent) route match on `server` to a [`Resolution`].
pub fn select<'a>(
    server: &'a ProjectServer,
    overrides: &PresetOverrides,
    matched: Option<&RouteMatch>,
) -> Resolution<'a> {
    let settings = &server.settings;
    let base_url = settings.proxy_base().map(str::to_string);

    let Some(matched) = matched else {
        return match base_url {
            Some(base_url) => Resolution::Proxy {
                base_url,
                response_id: None,
                from_preset: false,
            },
            None => Resolution::NotFound,
        };
    };

    let Some(route) = server.route(&matched.parent_id, &matched.route_id) else {
        return Resolution::NotFound;
    };

    // Overrides pointing at a response the route no longer has are ignored.
    let preset_choice = overrides
        .response_for(&server.name, &matched.parent_id, &matched.route_id)
        .and_then(|id| route.response(id));
    let from_preset = preset_choice.is_some();
    let selected = preset_choice.or_else(|| route.response(route.active_response_id()));

    let force_proxy_url = if settings.force_proxy {
        base_url.clone()
    } else {
        None
    };

    let Some(response) = selected else {
        return match force_proxy_url {
            Some(base_url) => Resolution::Proxy {
                base_url,
                response_id: None,
                from_preset: false,
            },
            None => Resolution::Misconfigured {
                response_id: None,
                reason: format!("Route '{}' has no active response", route.id()),
            },
        };
    };

    let mock = |body| Resolution::Mock {
        response,
        body,
        from_preset,
    };

    match &response.kind {
        ResponseKind::Obj { res } if response.block_proxy => mock(MockBody::Static(res)),
        ResponseKind::Func { exec } if response.block_proxy => mock(MockBody::Script(exec)),
        ResponseKind::Proxy { res: Some(res), .. } if response.block_proxy => {
            mock(MockBody::Static(res))
        }
        ResponseKind::Proxy { res: None, .. } if response.block_proxy => {
            Resolution::Misconfigured {
                response_id: Some(response.id.clone()),
                reason: format!(
                    "Response '{}' is a proxy response with proxying blocked",
                    response.id
                ),
            }
        }
        ResponseKind::Proxy { url, .. } => {
            let own_url = url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            match own_url.or(base_url) {
                Some(base_url) => Resolution::Proxy {
                    base_url,
                    response_id: Some(response.id.as_str()),
                    from_preset,
                },
                None => Resolution::Misconfigured {
                    response_id: Some(response.id.clone()),
                    reason: format!("Response '{}' has no proxy URL", response.id),
                },
            }
        }
        ResponseKind::Obj { .. } | ResponseKind::Func { .. } if force_proxy_url.is_some() => {
            Resolution::Proxy {
                base_url: force_proxy_url.unwrap_or_default(),
                response_id: Some(response.id.as_str()),
                from_preset,
            }
        }
        ResponseKind::Obj { res } => mock(MockBody::Static(res)),
        ResponseKind::Func { exec } => mock(MockBody::Script(exec)),
    }
}
