//! Hosts a dimmable light whose level drifts every few seconds.
//!
//! Run with `UPNP_LOG_MODE=development` to see the traffic.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use upnp_sdk::logging::init_logging_from_env;
use upnp_sdk::model::{generate_udn, Action, Argument, Direction, StateVariable};
use upnp_sdk::{
    ActionError, Device, FieldMap, Scpd, SdkError, ServerConfig, Service, SoapRequest, UpnpServer,
};

const DIMMING: &str = "urn:schemas-upnp-org:service:Dimming:1";
const DIMMING_ID: &str = "urn:upnp-org:serviceId:Dimming.0001";

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    init_logging_from_env()?;

    let scpd = Scpd::new()
        .with_action(Action::new("SetLoadLevelTarget").with_argument(Argument::new(
            "newLoadlevelTarget",
            Direction::In,
            "LoadLevelTarget",
        )))
        .with_action(Action::new("GetLoadLevelTarget").with_argument(Argument::new(
            "GetLoadlevelTarget",
            Direction::Out,
            "LoadLevelTarget",
        )))
        .with_state_variable(StateVariable::new("LoadLevelTarget", "ui1").evented(false))
        .with_state_variable(StateVariable::new("LoadLevelStatus", "ui1").evented(true));

    let udn = generate_udn();
    let light = Device::new("urn:schemas-upnp-org:device:DimmableLight:1", &udn)
        .with_friendly_name("Example Dimmable Light")
        .with_service(Service::new(DIMMING, DIMMING_ID).with_scpd(scpd));

    let server = UpnpServer::start(ServerConfig::default()).await?;
    let location = server.register_device(light)?;

    let level = Arc::new(AtomicU8::new(50));
    let current = Arc::clone(&level);
    server.register_action(&udn, DIMMING_ID, "GetLoadLevelTarget", move |_: &SoapRequest| {
        Ok::<_, ActionError>(
            FieldMap::new().with("GetLoadlevelTarget", current.load(Ordering::SeqCst).to_string()),
        )
    })?;
    let target = Arc::clone(&level);
    server.register_action(&udn, DIMMING_ID, "SetLoadLevelTarget", move |request: &SoapRequest| -> Result<FieldMap, ActionError> {
        let value = request
            .arguments
            .get("newLoadlevelTarget")
            .ok_or(ActionError::InvalidArgs)?
            .parse::<u8>()
            .map_err(|_| ActionError::ArgumentValueInvalid)?;
        if value > 100 {
            return Err(ActionError::ArgumentValueOutOfRange);
        }
        target.store(value, Ordering::SeqCst);
        Ok(FieldMap::new())
    })?;

    server.activate(&udn)?;
    println!("Serving {udn} at {location}");

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let next = (level.load(Ordering::SeqCst) + 10) % 110;
                level.store(next, Ordering::SeqCst);
                let properties = FieldMap::new().with("LoadLevelStatus", next.to_string());
                let delivered = server.set_property(&udn, DIMMING_ID, &properties).await?;
                println!("Level {next}, {delivered} subscribers notified");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    server.stop().await;
    Ok(())
}
