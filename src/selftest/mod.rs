//! Framebuffer acceleration self-test.
//!
//! Walks the same steps as [`DeviceContext::init`] but records each one, so a
//! failing setup shows which step broke instead of a single error.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::accel::{probe, Capabilities, DeviceContext, SurfaceGeometry};
use crate::config::ThresholdConfig;
use crate::fbdev::{Device, FramebufferDevice};

/// Run the self-test against the device at `path`.
pub fn run(path: &Path, thresholds: &ThresholdConfig) -> SelfTestReport {
    info!(path = %path.display(), "Self-test: checking framebuffer acceleration...");

    let mut report = SelfTestReport {
        device: path.to_path_buf(),
        capabilities: None,
        geometry: None,
        thresholds: *thresholds,
        results: Vec::new(),
    };

    // 1. Device node
    let device = match FramebufferDevice::open(path) {
        Ok(dev) => {
            report.push("Device", TestStatus::Pass, format!("Opened {}", path.display()), None);
            dev
        }
        Err(e) => {
            report.push(
                "Device",
                TestStatus::Fail,
                format!("Failed to open {}: {}", path.display(), e),
                Some("Check the device path and that the user can write to it."),
            );
            return report.finish();
        }
    };

    // 2. Capabilities
    let caps = probe::probe(&device);
    report.capabilities = Some(caps);
    if caps.copy {
        report.push("Copyarea", TestStatus::Pass, "FBIOCOPYAREA accepted".into(), None);
    } else {
        report.push(
            "Copyarea",
            TestStatus::Fail,
            "FBIOCOPYAREA rejected".into(),
            Some("The framebuffer driver must expose the copyarea ioctl."),
        );
    }
    if caps.fill {
        report.push("Fillrect", TestStatus::Pass, "FBIOFILLRECT accepted".into(), None);
    } else {
        report.push(
            "Fillrect",
            TestStatus::Warning,
            "FBIOFILLRECT rejected; fills will not be accelerated".into(),
            None,
        );
    }

    // 3. Geometry
    match device.screen_info() {
        Ok(info) => match SurfaceGeometry::from_screen_info(&info) {
            Ok(g) => report.push(
                "Geometry",
                TestStatus::Pass,
                format!(
                    "{}x{} @ {} bpp, stride {} words, {} usable rows",
                    g.width, g.height, g.bits_per_pixel, g.stride_words, g.usable_height
                ),
                None,
            ),
            Err(e) => report.push("Geometry", TestStatus::Fail, e.to_string(), None),
        },
        Err(e) => report.push(
            "Geometry",
            TestStatus::Fail,
            format!("Failed to query screen info: {}", e),
            None,
        ),
    }

    if !caps.copy || report.has_failures() {
        report.push(
            "Context",
            TestStatus::Skipped,
            "Not attempted after earlier failures".into(),
            None,
        );
        return report.finish();
    }

    // 4. Full context (maps the framebuffer)
    match DeviceContext::from_device(device, None) {
        Ok(ctx) => {
            ctx.apply_thresholds(thresholds);
            report.geometry = Some(*ctx.geometry());
            report.push(
                "Context",
                TestStatus::Pass,
                format!(
                    "Mapped {} bytes; copy threshold {} px, fill threshold {} px",
                    ctx.geometry().framebuffer_size,
                    ctx.copy_threshold(),
                    ctx.fill_threshold()
                ),
                None,
            );
            ctx.close();
        }
        Err(e) => report.push("Context", TestStatus::Fail, e.to_string(), None),
    }

    report.finish()
}

#[derive(Debug, Serialize)]
pub struct SelfTestReport {
    pub device: PathBuf,
    pub capabilities: Option<Capabilities>,
    pub geometry: Option<SurfaceGeometry>,
    pub thresholds: ThresholdConfig,
    pub results: Vec<ComponentResult>,
}

impl SelfTestReport {
    fn push(
        &mut self,
        component: &str,
        status: TestStatus,
        details: String,
        remediation: Option<&str>,
    ) {
        self.results.push(ComponentResult {
            component: component.to_string(),
            status,
            details,
            remediation: remediation.map(str::to_string),
        });
    }

    fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == TestStatus::Fail)
    }

    fn finish(self) -> Self {
        info!("Self-test complete. {} check(s) run.", self.results.len());
        self
    }

    /// True when the accelerated copy path is usable.
    pub fn is_ready(&self) -> bool {
        !self.has_failures() && self.geometry.is_some()
    }
}

/// Self-test result for a single step.
#[derive(Debug, Serialize, Clone)]
pub struct ComponentResult {
    pub component: String,
    pub status: TestStatus,
    pub details: String,
    pub remediation: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Warning,
    Skipped,
}
