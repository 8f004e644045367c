//! CRD command handler.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct CrdArgs {}

/// Print the GitSync CustomResourceDefinition as YAML.
pub fn run<W: Write>(_args: CrdArgs, mut writer: W) -> Result<()> {
	let yaml = gitsync_api::crd_yaml().context("serializing GitSync CRD")?;
	writer.write_all(yaml.as_bytes())?;
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prints_crd() {
		let mut output = Vec::new();
		run(CrdArgs {}, &mut output).unwrap();

		let crd: serde_json::Value = serde_yaml::from_slice(&output).unwrap();
		assert_eq!(crd["kind"], "CustomResourceDefinition");
		assert_eq!(crd["spec"]["group"], "gitsync.io");
		assert_eq!(crd["spec"]["names"]["kind"], "GitSync");
	}
}
