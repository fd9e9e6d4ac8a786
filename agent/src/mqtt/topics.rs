//! MQTT topic definitions

/// MQTT topic patterns
pub struct Topics;

impl Topics {
    const PREFIX: &'static str = "lockagent";

    /// Device command topic
    pub fn device_command(identity: &str) -> String {
        format!("{}/device/{}/command", Self::PREFIX, identity)
    }

    /// Parse a topic to extract the device identity
    pub fn parse_identity(topic: &str) -> Option<String> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() >= 3 && parts[0] == Self::PREFIX && parts[1] == "device" && !parts[2].is_empty() {
            Some(parts[2].to_string())
        } else {
            None
        }
    }

    /// Check if topic is a command topic
    pub fn is_command_topic(topic: &str) -> bool {
        topic.starts_with(Self::PREFIX) && topic.ends_with("/command")
    }
}
