use serde::Serialize;

use crate::config::GatewayId;

/// Name of the gateway on/off event
pub const EVENT_GATEWAY_STATE: &str = "toggle-state-gw";

/// Name of the console message event
pub const EVENT_CONSOLE: &str = "console-sim";

/// Live notification for external subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SimEvent {
    /// A gateway started or stopped transmitting
    #[serde(rename = "toggle-state-gw")]
    GatewayState {
        /// Gateway identifier
        id: GatewayId,
        /// Whether the gateway is now on
        on: bool,
    },
    /// Human-readable simulator message
    #[serde(rename = "console-sim")]
    Console {
        /// Message text
        message: String,
    },
}

impl SimEvent {
    /// Fixed event name
    pub fn name(&self) -> &'static str {
        match self {
            SimEvent::GatewayState { .. } => EVENT_GATEWAY_STATE,
            SimEvent::Console { .. } => EVENT_CONSOLE,
        }
    }

    pub(crate) fn console(message: impl Into<String>) -> Self {
        SimEvent::Console {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_with_event_name() {
        let json = serde_json::to_value(SimEvent::GatewayState { id: 3, on: true }).unwrap();
        assert_eq!(json["event"], EVENT_GATEWAY_STATE);
        assert_eq!(json["data"]["id"], 3);
        assert_eq!(SimEvent::console("START").name(), EVENT_CONSOLE);
    }
}
