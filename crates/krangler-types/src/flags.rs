use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Per-file attribute bits.
    ///
    /// The wire format declares these as an enumeration, but values are OR-ed
    /// together: every bit is an independent capability.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileFlags: u32 {
        const USER_CONFIG = 1;
        const VERSIONED_USER_CONFIG = 2;
        const ENCRYPTED = 4;
        const READ_ONLY = 8;
        const HIDDEN = 16;
        const EXECUTABLE = 32;
        const DIRECTORY = 64;
        const CUSTOM_EXECUTABLE = 128;
        const INSTALL_SCRIPT = 256;
        const SYMLINK = 512;
    }
}

impl FileFlags {
    /// Bits that make no sense on a directory entry.
    const NOT_FOR_DIRECTORIES: Self = Self::SYMLINK
        .union(Self::EXECUTABLE)
        .union(Self::CUSTOM_EXECUTABLE)
        .union(Self::INSTALL_SCRIPT);

    /// Parse the wire value. Returns `None` if any unknown bit is set.
    pub fn from_wire(value: i32) -> Option<Self> {
        let bits = u32::try_from(value).ok()?;
        Self::from_bits(bits)
    }

    /// The wire value of this flag set.
    pub fn to_wire(self) -> i32 {
        // All defined bits fit below 2^10.
        self.bits() as i32
    }

    /// Returns `true` if the set is a combination a real entry can carry.
    pub fn is_valid_combination(self) -> bool {
        !(self.contains(Self::DIRECTORY) && self.intersects(Self::NOT_FOR_DIRECTORIES))
    }

    pub fn is_directory(self) -> bool {
        self.contains(Self::DIRECTORY)
    }

    pub fn is_symlink(self) -> bool {
        self.contains(Self::SYMLINK)
    }

    pub fn is_executable(self) -> bool {
        self.intersects(Self::EXECUTABLE | Self::CUSTOM_EXECUTABLE)
    }
}
