pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde::xml_serde_enum;
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Connect")]
        Connect(ConnectAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct ConnectAction {
        #[xmlserde(ty = "untag")]
        pub connection: Connection,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum Connection {
        #[xmlserde(name = b"Stream")]
        Stream(StreamAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct StreamAction {
        #[xmlserde(name = b"url", ty = "attr")]
        pub url: String,
        #[xmlserde(name = b"name", ty = "attr")]
        pub name: Option<String>,
        #[xmlserde(name = b"track", ty = "attr")]
        pub track: Option<StreamTrack>,
        /// Delivered back to us in the `start` message's `customParameters`.
        #[xmlserde(name = b"Parameter", ty = "child")]
        pub parameters: Vec<StreamParameter>,
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct StreamParameter {
        #[xmlserde(name = b"name", ty = "attr")]
        pub name: String,
        #[xmlserde(name = b"value", ty = "attr")]
        pub value: String,
    }

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        StreamTrack {
            Inbound => "inbound_track",
            Outbound => "outbound_track",
            Both => "both_tracks",
        }
    }
}
pub use twiml::*;

mod ws {
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    /// Messages we write to the media stream.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(tag = "event", rename_all = "lowercase")]
    pub enum TwilioOutbound {
        #[serde(rename_all = "camelCase")]
        Media {
            stream_sid: String,
            media: OutboundMediaMeta,
        },
        /// Echoed back by Twilio once the audio queued before it has played
        #[serde(rename_all = "camelCase")]
        Mark {
            stream_sid: String,
            mark: OutboundMarkMeta,
        },
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct OutboundMediaMeta {
        /// Base64 µ-law at 8 kHz
        pub payload: String,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct OutboundMarkMeta {
        pub name: String,
    }

    /// Messages Twilio sends on the media stream.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "event", rename_all = "lowercase")]
    pub enum TwilioMessage {
        Connected {
            protocol: String,
            version: String,
        },
        #[serde(rename_all = "camelCase")]
        Start {
            sequence_number: String,
            stream_sid: String,
            start: StartMeta,
        },
        #[serde(rename_all = "camelCase")]
        Media {
            sequence_number: String,
            stream_sid: String,
            media: MediaMeta,
        },
        #[serde(rename_all = "camelCase")]
        Mark {
            sequence_number: String,
            stream_sid: String,
            mark: MarkMeta,
        },
        #[serde(rename_all = "camelCase")]
        Stop {
            sequence_number: String,
            stream_sid: String,
            stop: StopMeta,
        },
    }

    #[derive(Clone, Serialize, Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct StartMeta {
        pub stream_sid: String,
        pub account_sid: String,
        pub call_sid: String,
        #[serde(default)]
        pub tracks: Vec<String>,
        /// `<Parameter>`s from the TwiML that opened the stream
        #[serde(default)]
        pub custom_parameters: HashMap<String, String>,
        pub media_format: MediaFormat,
    }

    #[derive(Clone, Serialize, Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct MediaFormat {
        pub encoding: String,
        pub sample_rate: u32,
        pub channels: u16,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MediaMeta {
        #[serde(default)]
        pub track: Option<MediaTrack>,
        #[serde(default)]
        pub chunk: String,
        #[serde(default)]
        pub timestamp: String,
        pub payload: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum MediaTrack {
        Inbound,
        Outbound,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StopMeta {
        pub account_sid: String,
        pub call_sid: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MarkMeta {
        pub name: String,
    }
}
pub use ws::*;

mod voice {
    use serde::Deserialize;

    /// Form body of Twilio's incoming-call webhook. Only the fields we route on
    /// are required.
    #[derive(Clone, Deserialize, Debug)]
    #[serde(rename_all = "PascalCase")]
    pub struct TwilioConnectPayload {
        pub call_sid: String,
        pub account_sid: Option<String>,
        pub call_status: Option<String>,
        pub direction: Option<String>,
        pub from: String,
        pub to: String,
        pub from_city: Option<String>,
        pub from_country: Option<String>,
    }
}
pub use voice::*;
