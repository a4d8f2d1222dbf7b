//! User-Friendly Error Formatting
//!
//! Turns startup failures into a message with likely causes, printed to
//! stderr before the process exits.

use std::fmt::Write;

/// Format error for user consumption
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║              graphene-session failed to start              ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = format!("{:#}", error);

    if error_msg.contains("org.gnome.SessionManager") {
        format_name_taken_error(&mut output);
    } else if error_msg.contains("session bus") || error_msg.contains("D-Bus") {
        format_bus_error(&mut output);
    } else if error_msg.contains("config") {
        format_config_error(&mut output);
    } else {
        writeln!(&mut output, "Error: {}", error).ok();
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "  Run with --verbose for detailed logs: graphene-session -vv"
    )
    .ok();

    output
}

fn format_bus_error(output: &mut String) {
    writeln!(output, "D-Bus Session Bus Unavailable").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. No session bus was started for this login").ok();
    writeln!(output, "     → Check: echo $DBUS_SESSION_BUS_ADDRESS").ok();
    writeln!(
        output,
        "     → Start the session through dbus-run-session graphene-session"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. The bus daemon exited").ok();
    writeln!(output, "     → Run: systemctl --user status dbus").ok();
}

fn format_name_taken_error(output: &mut String) {
    writeln!(output, "Another Session Manager Is Running").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The bus name org.gnome.SessionManager is already owned."
    )
    .ok();
    writeln!(output).ok();
    writeln!(
        output,
        "  → Check: busctl --user status org.gnome.SessionManager"
    )
    .ok();
    writeln!(output, "  → Only one session manager may run per login").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "  → Default location: /etc/graphene/session.toml").ok();
    writeln!(
        output,
        "  → Or specify: graphene-session -c /path/to/session.toml"
    )
    .ok();
    writeln!(output, "  → Check for TOML typos and unknown log levels").ok();
}
