//! `eventhaiti://` deep links opened by the mobile app.

use crate::types::{EventId, TicketId};
use std::fmt;
use thiserror::Error;

/// URL scheme of the mobile app.
pub const SCHEME: &str = "eventhaiti";

/// A link into the app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeepLink {
    /// `eventhaiti://event/{id}`
    Event(EventId),
    /// `eventhaiti://ticket/{id}`
    Ticket(TicketId),
    /// `eventhaiti://staff-invite?eventId={id}&token={token}`
    StaffInvite {
        /// Event the invite is for
        event_id: EventId,
        /// One-time invite token
        token: String,
    },
}

/// A string that is not an app link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid deep link: {0}")]
pub struct DeepLinkError(pub String);

impl DeepLink {
    /// Render as a URL.
    #[must_use]
    pub fn to_url(&self) -> String {
        match self {
            Self::Event(id) => format!("{SCHEME}://event/{}", urlencoding::encode(id.as_str())),
            Self::Ticket(id) => format!("{SCHEME}://ticket/{}", urlencoding::encode(id.as_str())),
            Self::StaffInvite { event_id, token } => format!(
                "{SCHEME}://staff-invite?eventId={}&token={}",
                urlencoding::encode(event_id.as_str()),
                urlencoding::encode(token)
            ),
        }
    }

    /// Parse a URL produced by [`DeepLink::to_url`].
    ///
    /// # Errors
    ///
    /// [`DeepLinkError`] for other schemes, unknown routes and missing ids.
    pub fn parse(url: &str) -> Result<Self, DeepLinkError> {
        let invalid = || DeepLinkError(url.to_string());
        let rest = url
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(invalid)?;
        let (route, query) = rest.split_once('?').unwrap_or((rest, ""));
        let route = route.trim_end_matches('/');

        let decode = |raw: &str| -> Result<String, DeepLinkError> {
            let value = urlencoding::decode(raw).map_err(|_| invalid())?.into_owned();
            if value.is_empty() { Err(invalid()) } else { Ok(value) }
        };

        if let Some(id) = route.strip_prefix("event/") {
            return Ok(Self::Event(EventId::new(decode(id)?)));
        }
        if let Some(id) = route.strip_prefix("ticket/") {
            return Ok(Self::Ticket(TicketId::new(decode(id)?)));
        }
        if route == "staff-invite" {
            let mut event_id = None;
            let mut token = None;
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("eventId", value)) => event_id = Some(decode(value)?),
                    Some(("token", value)) => token = Some(decode(value)?),
                    _ => {},
                }
            }
            return match (event_id, token) {
                (Some(event_id), Some(token)) => Ok(Self::StaffInvite {
                    event_id: EventId::new(event_id),
                    token,
                }),
                _ => Err(invalid()),
            };
        }
        Err(invalid())
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}
