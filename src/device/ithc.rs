use super::DeviceProfile;
use crate::ipts::Protocol;

pub const ITHC: DeviceProfile = DeviceProfile {
    name: "ITHC",
    device: "/dev/ithc",
    protocol: Protocol::Hid,
    buffer_size: 0x10000,
};
