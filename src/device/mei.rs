use super::DeviceProfile;
use crate::ipts::Protocol;

/// Doorbell interface exposed through the management engine on older
/// controllers.
pub const MEI: DeviceProfile = DeviceProfile {
    name: "MEI",
    device: "/dev/ipts",
    protocol: Protocol::Container,
    buffer_size: 16384,
};
