// Linux-specific identity helpers: /proc and /etc/os-release.

/// First "model name" from /proc/cpuinfo. Preferred over sysinfo, which may report "cpu0".
pub(super) fn read_cpu_model_linux() -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    let line = content.lines().find(|l| l.starts_with("model name"))?;
    line.find(": ")
        .map(|i| line[i + 2..].trim())
        .filter(|s| !s.is_empty() && *s != "cpu0")
        .map(str::to_string)
}

/// Distro name from /etc/os-release (PRETTY_NAME, else NAME).
pub(super) fn read_os_pretty_name_linux() -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let content = std::fs::read_to_string("/etc/os-release").ok()?;
    os_release_value(&content, "PRETTY_NAME=").or_else(|| os_release_value(&content, "NAME="))
}

fn os_release_value(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}
