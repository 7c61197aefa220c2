use jbod::{Instruction, JbodDevice, Op};
use log::{debug, info};

use crate::error::{RaidError, Result};

/// Write-permission state as last reported by the device. A session that
/// never asked is `Unknown`, which denies writes just like `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Unknown,
    Granted,
    Denied,
}

/// Tracks the mount and write-permission flags for one controller, and
/// issues the matching control instructions to the device. Data
/// operations require a mount; writes additionally require a grant.
pub struct Session {
    mounted: bool,
    permission: Permission,
}

impl Session {
    pub fn new() -> Self {
        Session {
            mounted: false,
            permission: Permission::Unknown,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn can_write(&self) -> bool {
        self.permission == Permission::Granted
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn mount(&mut self, dev: &mut impl JbodDevice) -> Result<()> {
        if self.mounted {
            return Err(RaidError::AlreadyMounted);
        }
        dev.execute(Instruction::control(Op::Mount).encode(), None);
        self.mounted = true;
        info!("array mounted");
        Ok(())
    }

    pub fn unmount(&mut self, dev: &mut impl JbodDevice) -> Result<()> {
        if !self.mounted {
            return Err(RaidError::NotMounted);
        }
        dev.execute(Instruction::control(Op::Unmount).encode(), None);
        self.mounted = false;
        info!("array unmounted");
        Ok(())
    }

    /// Asks the device for write permission and records its verdict:
    /// status 0 is a grant, anything else a denial.
    pub fn grant_write(&mut self, dev: &mut impl JbodDevice) -> Permission {
        let status = dev.execute(Instruction::control(Op::WritePermission).encode(), None);
        self.permission = if status == 0 {
            Permission::Granted
        } else {
            Permission::Denied
        };
        debug!("write permission now {:?}", self.permission);
        self.permission
    }

    /// Tells the device to drop write permission. The local state becomes
    /// `Denied` unconditionally; the device's status code carries no
    /// information worth folding into the flag here.
    pub fn revoke_write(&mut self, dev: &mut impl JbodDevice) {
        dev.execute(
            Instruction::control(Op::RevokeWritePermission).encode(),
            None,
        );
        self.permission = Permission::Denied;
        debug!("write permission revoked");
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbod::Block;

    /// Records every instruction word and answers each with a scripted
    /// status, newest first defaulting to success.
    struct ScriptedDevice {
        issued: Vec<u32>,
        statuses: Vec<i32>,
    }

    impl ScriptedDevice {
        fn succeeding() -> Self {
            ScriptedDevice {
                issued: Vec::new(),
                statuses: Vec::new(),
            }
        }

        fn with_statuses(statuses: Vec<i32>) -> Self {
            ScriptedDevice {
                issued: Vec::new(),
                statuses,
            }
        }
    }

    impl JbodDevice for ScriptedDevice {
        fn execute(&mut self, word: u32, _block: Option<&mut Block>) -> i32 {
            self.issued.push(word);
            if self.statuses.is_empty() {
                0
            } else {
                self.statuses.remove(0)
            }
        }
    }

    #[test]
    fn mount_issues_the_instruction_once() {
        let mut dev = ScriptedDevice::succeeding();
        let mut session = Session::new();

        session.mount(&mut dev).unwrap();
        assert!(session.is_mounted());
        assert_eq!(session.mount(&mut dev), Err(RaidError::AlreadyMounted));
        assert_eq!(dev.issued, vec![Instruction::control(Op::Mount).encode()]);
    }

    #[test]
    fn unmount_requires_a_mount_first() {
        let mut dev = ScriptedDevice::succeeding();
        let mut session = Session::new();

        assert_eq!(session.unmount(&mut dev), Err(RaidError::NotMounted));
        assert!(dev.issued.is_empty());

        session.mount(&mut dev).unwrap();
        session.unmount(&mut dev).unwrap();
        assert!(!session.is_mounted());
    }

    #[test]
    fn grant_records_the_device_verdict() {
        let mut dev = ScriptedDevice::with_statuses(vec![-1, 0]);
        let mut session = Session::new();
        assert!(!session.can_write());

        assert_eq!(session.grant_write(&mut dev), Permission::Denied);
        assert!(!session.can_write());

        assert_eq!(session.grant_write(&mut dev), Permission::Granted);
        assert!(session.can_write());
    }

    #[test]
    fn revoke_denies_regardless_of_device_status() {
        let mut dev = ScriptedDevice::with_statuses(vec![0, -1]);
        let mut session = Session::new();

        session.grant_write(&mut dev);
        assert!(session.can_write());

        // Even a failing revoke instruction leaves the session denied.
        session.revoke_write(&mut dev);
        assert_eq!(session.permission(), Permission::Denied);
        assert!(!session.can_write());
    }
}
