//! Hub variants.
//!
//! The gateway exposes a small fixed set of hubs. Each variant carries the
//! events it listens for and the remote calls that declare interest in data
//! once a session is ready. The variant is chosen once, when a session is
//! built; nothing re-dispatches on a hub name string afterwards.

// Rust guideline compliant 2026-02

use serde::Serialize;

/// Routing key used to pick a forwarding destination for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    /// Account, order, position and fill updates.
    User,
    /// Quotes, trades and depth for instruments.
    Market,
}

impl EventClass {
    /// Classifies an event by its name.
    ///
    /// Returns `None` for names no hub binds.
    #[must_use]
    pub fn of(event_name: &str) -> Option<Self> {
        HubKind::ALL.iter().find_map(|hub| {
            hub.binds(event_name).then_some(match hub {
                HubKind::User => Self::User,
                HubKind::Market => Self::Market,
            })
        })
    }

    /// Lowercase label used in logs and health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Market => "market",
        }
    }
}

impl std::fmt::Display for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter a remote subscription call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// The configured account identifier.
    AccountId,
    /// One configured instrument identifier; the call is issued once per
    /// configured instrument.
    ContractId,
}

impl Param {
    /// Name used when logging a skipped call.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AccountId => "account id",
            Self::ContractId => "contract id",
        }
    }
}

/// One remote call to invoke whenever a session becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    /// Remote method name on the hub.
    pub method: &'static str,
    /// Parameters the call requires, in argument order.
    pub params: &'static [Param],
}

const USER_EVENTS: &[&str] = &[
    "GatewayUserAccount",
    "GatewayUserOrder",
    "GatewayUserPosition",
    "GatewayUserTrade",
];

const MARKET_EVENTS: &[&str] = &["GatewayQuote", "GatewayTrade", "GatewayDepth"];

const USER_SUBSCRIPTIONS: &[SubscriptionDescriptor] = &[
    SubscriptionDescriptor { method: "SubscribeAccounts", params: &[] },
    SubscriptionDescriptor { method: "SubscribeOrders", params: &[Param::AccountId] },
    SubscriptionDescriptor { method: "SubscribePositions", params: &[Param::AccountId] },
    SubscriptionDescriptor { method: "SubscribeTrades", params: &[Param::AccountId] },
];

const MARKET_SUBSCRIPTIONS: &[SubscriptionDescriptor] = &[
    SubscriptionDescriptor { method: "SubscribeContractQuotes", params: &[Param::ContractId] },
    SubscriptionDescriptor { method: "SubscribeContractTrades", params: &[Param::ContractId] },
    SubscriptionDescriptor { method: "SubscribeContractMarketDepth", params: &[Param::ContractId] },
];

/// A named logical channel on the streaming gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubKind {
    /// Per-account hub: accounts, orders, positions, fills.
    User,
    /// Market data hub: quotes, trades, depth.
    Market,
}

impl HubKind {
    /// Every hub the bridge knows about.
    pub const ALL: [Self; 2] = [Self::User, Self::Market];

    /// Path segment appended to the gateway hub URL.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Market => "market",
        }
    }

    /// Events this hub listens for.
    #[must_use]
    pub fn events(self) -> &'static [&'static str] {
        match self {
            Self::User => USER_EVENTS,
            Self::Market => MARKET_EVENTS,
        }
    }

    /// Whether `event_name` is one of this hub's bound events.
    #[must_use]
    pub fn binds(self, event_name: &str) -> bool {
        self.events().contains(&event_name)
    }

    /// Remote calls issued on every entry into the ready state.
    #[must_use]
    pub fn subscriptions(self) -> &'static [SubscriptionDescriptor] {
        match self {
            Self::User => USER_SUBSCRIPTIONS,
            Self::Market => MARKET_SUBSCRIPTIONS,
        }
    }
}

impl std::fmt::Display for HubKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

impl std::str::FromStr for HubKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "market" => Ok(Self::Market),
            other => anyhow::bail!("unknown hub '{}' (expected 'user' or 'market')", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        assert_eq!(EventClass::of("GatewayUserOrder"), Some(EventClass::User));
        assert_eq!(EventClass::of("GatewayUserAccount"), Some(EventClass::User));
        assert_eq!(EventClass::of("GatewayQuote"), Some(EventClass::Market));
        assert_eq!(EventClass::of("GatewayDepth"), Some(EventClass::Market));
        assert_eq!(EventClass::of("GatewaySomethingElse"), None);
        assert_eq!(EventClass::of(""), None);
    }

    #[test]
    fn test_hub_bindings_do_not_overlap() {
        for event in HubKind::User.events() {
            assert!(!HubKind::Market.binds(event), "{event} bound by both hubs");
        }
    }

    #[test]
    fn test_user_subscriptions_need_account() {
        let subs = HubKind::User.subscriptions();
        assert_eq!(subs[0].method, "SubscribeAccounts");
        assert!(subs[0].params.is_empty());
        assert!(subs[1..].iter().all(|s| s.params == [Param::AccountId]));
    }

    #[test]
    fn test_market_subscriptions_need_contract() {
        let methods: Vec<_> = HubKind::Market.subscriptions().iter().map(|s| s.method).collect();
        assert_eq!(
            methods,
            vec!["SubscribeContractQuotes", "SubscribeContractTrades", "SubscribeContractMarketDepth"]
        );
    }

    #[test]
    fn test_parse_hub_kind() {
        assert_eq!("user".parse::<HubKind>().unwrap(), HubKind::User);
        assert_eq!("MARKET".parse::<HubKind>().unwrap(), HubKind::Market);
        assert!("orders".parse::<HubKind>().is_err());
    }
}
