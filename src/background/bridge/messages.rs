use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::background::storage::entities::TrackingData;

/// `windowId` the browser reports when none of its windows has focus.
pub const WINDOW_ID_NONE: i64 = -1;

/// Name of the alarm that drives month rollover checks.
pub const MONTH_CHANGE_ALARM: &str = "monthChangeCheck";

/// The subset of a browser tab the tracker cares about.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: i64,
    #[serde(default)]
    pub window_id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChangeInfo {
    #[serde(default)]
    pub url: Option<String>,
}

/// Everything the browser side sends to the host.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    TabActivated {
        tab: Tab,
    },
    TabUpdated {
        tab_id: i64,
        #[serde(default)]
        change_info: ChangeInfo,
        tab: Tab,
    },
    WindowFocusChanged {
        window_id: i64,
        #[serde(default)]
        active_tab: Option<Tab>,
    },
    StorageChanged {
        namespace: String,
        keys: Vec<String>,
    },
    Alarm {
        name: String,
    },
    GetActiveState {
        #[serde(default)]
        request_id: Option<u64>,
    },
    RegisterPopup,
    UnregisterPopup,
    ReloadConfig,
}

/// Answer to `getActiveState`. When idle this serializes to exactly `{"isActive":false}`.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActiveState {
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub start_time: Option<DateTime<Utc>>,
}

impl ActiveState {
    pub fn idle() -> Self {
        Self {
            is_active: false,
            domain: None,
            start_time: None,
        }
    }
}

/// Everything the host sends back to the browser side.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    Response {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        payload: ActiveState,
    },
    TrackingUpdate {
        tracking_data: TrackingData,
    },
    SetIcon {
        tracking: bool,
    },
}

impl Outbound {
    /// Value of the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Response { .. } => "response",
            Outbound::TrackingUpdate { .. } => "trackingUpdate",
            Outbound::SetIcon { .. } => "setIcon",
        }
    }
}
