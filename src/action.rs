/// Canonical action construction
///
/// Assembles the Command and Action messages for a spawn. Everything that is
/// order-insensitive (environment, outputs, platform properties) is sorted
/// before encoding, so two spawns with equal fields always produce the same
/// action key.
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::context::SpawnExecutionContext;
use crate::digest::{ActionKey, DigestUtil};
use crate::merkle::TreeBuilder;
use crate::proto::{Action, Command, Digest, EnvironmentVariable, Platform, Property};
use crate::spawn::Spawn;

/// Derive the action key of a spawn from its command, input tree, outputs,
/// platform, timeout and cacheability
pub fn spawn_action_key(
    spawn: &Spawn,
    context: &dyn SpawnExecutionContext,
    tree_builder: &dyn TreeBuilder,
    digest_util: DigestUtil,
) -> io::Result<ActionKey> {
    let tree = tree_builder.build_tree(context.input_mapping(), context.metadata_provider())?;
    let command = build_command(spawn.arguments(), spawn.environment());
    let action = build_action(
        spawn.output_files(),
        digest_util.compute_message(&command),
        tree.root_digest().clone(),
        spawn.platform(),
        context.timeout(),
        spawn.may_be_cached(),
    );
    Ok(digest_util.compute_action_key(&action))
}

/// Build the Command message from an argument vector and environment
pub fn build_command(arguments: &[String], environment: &BTreeMap<String, String>) -> Command {
    // BTreeMap iteration is already sorted by name
    let environment_variables = environment
        .iter()
        .map(|(name, value)| EnvironmentVariable {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    Command {
        arguments: arguments.to_vec(),
        environment_variables,
    }
}

/// Build the Action message that is digested into the action key
pub fn build_action(
    outputs: &[PathBuf],
    command_digest: Digest,
    input_root_digest: Digest,
    platform: &BTreeMap<String, String>,
    timeout: Option<Duration>,
    cacheable: bool,
) -> Action {
    let mut output_files: Vec<String> = outputs
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    output_files.sort();
    output_files.dedup();

    Action {
        command_digest: Some(command_digest),
        input_root_digest: Some(input_root_digest),
        output_files,
        output_directories: Vec::new(),
        platform: build_platform(platform),
        timeout: timeout.filter(|t| !t.is_zero()).map(to_proto_duration),
        do_not_cache: !cacheable,
    }
}

fn build_platform(properties: &BTreeMap<String, String>) -> Option<Platform> {
    if properties.is_empty() {
        return None;
    }

    Some(Platform {
        properties: properties
            .iter()
            .map(|(name, value)| Property {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    })
}

fn to_proto_duration(timeout: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: timeout.as_secs() as i64,
        nanos: timeout.subsec_nanos() as i32,
    }
}
