//! Searches the network and prints every device and service found.

use std::time::Duration;

use upnp_sdk::logging::init_logging_from_env;
use upnp_sdk::{ControlPoint, ControlPointConfig, ControlPointEvent, SdkError};

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    init_logging_from_env()?;

    let control_point = ControlPoint::start(ControlPointConfig::default()).await?;
    let mut events = control_point.events();

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControlPointEvent::DeviceAdded(udn) => println!("+ {udn}"),
                ControlPointEvent::DeviceRemoved(udn) => println!("- {udn}"),
                ControlPointEvent::SubscriptionRemoved { sid, udn } => {
                    println!("  subscription {sid} on {udn} gone")
                }
            }
        }
    });

    let responses = control_point
        .send_msearch("ssdp:all", Duration::from_secs(3))
        .await?;
    println!("{responses} search responses");
    tokio::time::sleep(Duration::from_secs(2)).await;

    for device in control_point.devices() {
        let device = device.read();
        for node in device.all_devices() {
            println!(
                "{} ({})",
                node.friendly_name().unwrap_or("unnamed"),
                node.device_type()
            );
            for service in node.services() {
                let actions = service.scpd.as_ref().map_or(0, |scpd| scpd.actions.len());
                println!("    {} [{} actions]", service.service_id(), actions);
            }
        }
    }

    control_point.finish().await;
    Ok(())
}
