//! Request and response framing for the gateway's protobuf endpoint.
//!
//! Every request is a `Message` naming a sender and a recipient plus one
//! embedded descriptor: a config file request, a signed payload query or the
//! firmware marker. Responses come back in the same envelope with a JSON text
//! (or the typed firmware record) embedded.

use protobuf::Message as _;

use crate::error::{Error, Result};
use crate::protos::tedapi::{Message, MessageEnvelope};
use crate::queries::Query;
use crate::snapshot::{FirmwareInfo, GatewayPart, VersionInfo, WirelessDevice};

/// Endpoint for requests addressed to the gateway itself.
pub const PRIMARY_PATH: &str = "tedapi/v1";

/// Endpoint that returns the gateway DIN as plain text.
pub const DIN_PATH: &str = "tedapi/din";

const CONFIG_FILE: &str = "config.json";

pub fn device_path(din: &str) -> String {
    format!("tedapi/device/{din}/v1")
}

/// Who a request is addressed to.
enum Route<'a> {
    Primary { din: &'a str },
    Device { primary: &'a str, device: &'a str },
}

fn new_message(route: Route<'_>) -> Message {
    let mut msg = Message::new();
    let envelope = msg.message.mut_or_insert_default();
    envelope.delivery_channel = 1;
    let tail = match route {
        Route::Primary { din } => {
            envelope.sender.mut_or_insert_default().set_local(1);
            envelope.recipient.mut_or_insert_default().set_din(din.to_string());
            1
        }
        Route::Device { primary, device } => {
            envelope.sender.mut_or_insert_default().set_din(primary.to_string());
            envelope.recipient.mut_or_insert_default().set_din(device.to_string());
            2
        }
    };
    msg.tail.mut_or_insert_default().value = tail;
    msg
}

fn envelope_mut(msg: &mut Message) -> &mut MessageEnvelope {
    msg.message.mut_or_insert_default()
}

fn attach_query(msg: &mut Message, query: &Query) {
    let send = envelope_mut(msg).payload.mut_or_insert_default().mut_send();
    send.num = 2;
    let payload = send.payload.mut_or_insert_default();
    payload.value = 1;
    payload.text = query.text.to_string();
    send.code = query.signature.to_vec();
    send.b.mut_or_insert_default().value = query.variables.to_string();
}

pub fn config_request(din: &str) -> Message {
    let mut msg = new_message(Route::Primary { din });
    let send = envelope_mut(&mut msg).config.mut_or_insert_default().mut_send();
    send.num = 1;
    send.file = CONFIG_FILE.to_string();
    msg
}

pub fn firmware_request(din: &str) -> Message {
    let mut msg = new_message(Route::Primary { din });
    envelope_mut(&mut msg)
        .firmware
        .mut_or_insert_default()
        .set_request(String::new());
    msg
}

pub fn query_request(din: &str, query: &Query) -> Message {
    let mut msg = new_message(Route::Primary { din });
    attach_query(&mut msg, query);
    msg
}

pub fn device_query_request(primary: &str, device: &str, query: &Query) -> Message {
    let mut msg = new_message(Route::Device { primary, device });
    attach_query(&mut msg, query);
    msg
}

pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    Ok(msg.write_to_bytes()?)
}

pub fn decode(body: &[u8]) -> Result<Message> {
    Ok(Message::parse_from_bytes(body)?)
}

/// Text of a config file response.
pub fn config_text(msg: &Message) -> Result<&str> {
    let config = msg.message.get_or_default().config.get_or_default();
    if !config.has_recv() {
        return Err(Error::decode("config response", "no file in envelope"));
    }
    Ok(&config.recv().file.get_or_default().text)
}

/// Text of a payload query response.
pub fn query_text(msg: &Message) -> Result<&str> {
    let payload = msg.message.get_or_default().payload.get_or_default();
    if !payload.has_recv() {
        return Err(Error::decode("query response", "no payload in envelope"));
    }
    Ok(&payload.recv().text)
}

pub fn firmware_info(msg: &Message) -> Result<FirmwareInfo> {
    let firmware = msg.message.get_or_default().firmware.get_or_default();
    if !firmware.has_system() {
        return Err(Error::decode("firmware response", "no system record in envelope"));
    }
    let system = firmware.system();
    let gateway = system.gateway.get_or_default();
    let version = system.version.get_or_default();
    let five = system.five.get_or_default();
    let wireless = system
        .wireless
        .get_or_default()
        .device
        .iter()
        .map(|device| WirelessDevice {
            company: device.company.get_or_default().value.clone(),
            model: device.model.get_or_default().value.clone(),
            fcc_id: device.fcc_id.get_or_default().value.clone(),
            ic: device.ic.get_or_default().value.clone(),
        })
        .collect();

    Ok(FirmwareInfo {
        gateway: GatewayPart {
            part_number: gateway.part_number.clone(),
            serial_number: gateway.serial_number.clone(),
        },
        din: system.din.clone(),
        version: VersionInfo {
            text: version.text.clone(),
            githash: version.githash.iter().map(|b| format!("{b:02x}")).collect(),
        },
        five: GatewayPart {
            part_number: five.part_number.clone(),
            serial_number: five.serial_number.clone(),
        },
        six: system.six,
        wireless,
    })
}
