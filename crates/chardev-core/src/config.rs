use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ActuationConfig {
    /// Shortest half-period the toggle loop will sleep for, whatever the
    /// requested frequency.
    pub min_half_period: Duration,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            min_half_period: Duration::from_micros(50),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub capacity: usize,
    pub line_id: u32,
    pub actuation: ActuationConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            line_id: 16,
            actuation: ActuationConfig::default(),
        }
    }
}
