//! Port listing.

use anyhow::{Context, Result};
use bootagent::{NativePortEnumerator, PortEnumerator, PortInfo};
use console::style;

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", ports_json(&ports)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        eprintln!("  {} {}", style("•").green(), describe(port));
    }
    Ok(())
}

fn ports_json(ports: &[PortInfo]) -> Result<String> {
    let output = serde_json::json!({
        "ok": true,
        "data": {
            "ports": ports,
        }
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

fn describe(port: &PortInfo) -> String {
    let mut line = style(&port.name)
        .cyan()
        .to_string();
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!(" ({vid:04X}:{pid:04X})"));
    }
    if let Some(product) = port
        .product
        .as_deref()
        .filter(|p| !p.is_empty())
    {
        line.push_str(&format!(" - {}", style(product).dim()));
    }
    line
}
