//! Lifecycle notifications broadcast by the control point.

/// Something changed in the device cache or the subscription set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPointEvent {
    /// A description was fetched and the device inserted or replaced
    DeviceAdded(String),
    /// The device said byebye or its announcement lifetime ran out
    DeviceRemoved(String),
    /// A subscription was cancelled, expired, or lost with its device
    SubscriptionRemoved { sid: String, udn: String },
}

impl ControlPointEvent {
    /// UDN of the device concerned.
    pub fn udn(&self) -> &str {
        match self {
            ControlPointEvent::DeviceAdded(udn) | ControlPointEvent::DeviceRemoved(udn) => udn,
            ControlPointEvent::SubscriptionRemoved { udn, .. } => udn,
        }
    }
}
