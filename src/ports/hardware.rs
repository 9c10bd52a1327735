use crate::domain::HardwareProfile;

/// Port for hardware detection operations.
pub trait HardwareDetector: Send + Sync {
    /// Probe the host.
    ///
    /// Never fails: anything that cannot be probed is reported as unknown or
    /// absent in the returned profile.
    fn detect(&self) -> HardwareProfile;

    /// Stable identifier of this host, used to key cached profiles.
    fn host_id(&self) -> String;
}
