//! Human-readable descriptions of execution environments.

use super::types::RunnerDescriptor;

impl RunnerDescriptor {
    fn browser_label(&self) -> Option<&str> {
        self.browser_name.as_deref().or(self.browser.as_deref())
    }

    fn version_label(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or(self.platform_version.as_deref())
            .or(self.browser_version.as_deref())
    }

    fn platform_label(&self) -> Option<String> {
        match &self.os {
            Some(os) => Some(
                format!("{} {}", os, self.os_version.as_deref().unwrap_or_default())
                    .trim()
                    .to_string(),
            ),
            None => self
                .platform
                .as_deref()
                .or(self.platform_name.as_deref())
                .map(str::to_string),
        }
    }

    /// Describe the environment, e.g. `chrome (v91) on Windows 10` or
    /// `iPhone X on iOS 12.1 executing Safari`.
    ///
    /// The terse form drops connecting words. Returns an empty string when
    /// the capabilities name nothing recognizable.
    pub fn describe(&self, verbose: bool) -> String {
        let browser = self.browser_label().unwrap_or_default();
        let version = self.version_label();
        let platform = self.platform_label();

        if let Some(custom) = &self.custom_name {
            let mut label = format!("{} - {}", custom, browser);
            if let Some(version) = version {
                label.push_str(&format!(" (v{})", version));
            }
            return label.trim_end_matches([' ', '-']).to_string();
        }

        if let Some(device) = &self.device_name {
            let program = self
                .app
                .as_deref()
                .map(|app| app.replace("sauce-storage:", ""))
                .filter(|app| !app.is_empty())
                .or_else(|| self.browser_name.clone());

            let mut parts = vec![device.clone()];
            if verbose {
                parts.push("on".to_string());
            }
            parts.extend(platform);
            parts.extend(version.map(str::to_string));
            if verbose {
                if let Some(program) = program {
                    parts.push(format!("executing {}", program));
                }
            }
            return parts.join(" ");
        }

        if !verbose {
            return [Some(browser), version, platform.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
        }

        let mut label = browser.to_string();
        if let Some(version) = version {
            label.push_str(&format!(" (v{})", version));
        }
        if let Some(platform) = platform {
            label.push_str(&format!(" on {}", platform));
        }
        label.trim().to_string()
    }
}
