// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `topic` command.

use fgate_core::topic::{encode_to_json, parse_topic, Topic};

use crate::cli::{Cli, OutputFormat, TopicArgs};
use crate::error::{BinError, BinResult};

/// Parses an address and prints the resulting topic.
pub fn topic(_cli: &Cli, args: TopicArgs) -> BinResult<()> {
    let topic = parse_topic(&args.address);
    if !topic.is_valid() {
        return Err(BinError::usage(format!("invalid topic address '{}'", args.address)));
    }

    match args.format {
        OutputFormat::Text => {
            for (field, value) in describe_topic(&topic) {
                println!("  {:<12} {}", format!("{}:", field), value);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::to_string_pretty(&encode_to_json(&topic))?;
            println!("{}", output);
        }
    }
    Ok(())
}

/// Field name and value pairs for text output.
pub fn describe_topic(topic: &Topic) -> Vec<(&'static str, String)> {
    vec![
        ("Name", topic.topic_name.clone()),
        ("System", topic.system_type.to_string()),
        ("SystemName", topic.system_name.clone()),
        ("Type", topic.topic_type.to_string()),
        ("Node", topic.topic_node.clone()),
        ("Path", topic.topic_path.clone()),
        ("BrowsePath", topic.browse_path.join("/")),
        ("Format", topic.data_format.to_string()),
        ("FQN", topic.fqn()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_node_topic() {
        let topic = parse_topic("Opc/Line1/Node:Value/ns=2;s=Speed");
        let fields = describe_topic(&topic);
        let get = |name: &str| {
            fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value.clone())
                .unwrap()
        };
        assert_eq!(get("System"), "Opc");
        assert_eq!(get("SystemName"), "Line1");
        assert_eq!(get("Type"), "Node");
        assert_eq!(get("Node"), "ns=2;s=Speed");
        assert_eq!(get("Format"), "Value");
    }

    #[test]
    fn test_invalid_address_is_usage_error() {
        let cli = <Cli as clap::Parser>::parse_from(["fgate", "topic", "nonsense"]);
        let args = TopicArgs {
            address: "nonsense".to_string(),
            format: OutputFormat::Text,
        };
        let err = topic(&cli, args).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
