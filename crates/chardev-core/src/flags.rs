use bitflags::bitflags;

/// Linux `O_TRUNC`.
pub const POSIX_O_TRUNC: u32 = 0o1000;
/// Linux `O_APPEND`.
pub const POSIX_O_APPEND: u32 = 0o2000;

bitflags! {
    /// File flags that change how the buffer behaves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u8 {
        /// Discard existing contents on open.
        const TRUNCATE = 1 << 0;
        /// Every write lands at the current high-water mark.
        const APPEND = 1 << 1;
    }
}

impl OpenFlags {
    /// Pick out the bits this device cares about from raw `open(2)` flags.
    pub fn from_posix(bits: u32) -> Self {
        let mut flags = Self::empty();
        if bits & POSIX_O_TRUNC != 0 {
            flags |= Self::TRUNCATE;
        }
        if bits & POSIX_O_APPEND != 0 {
            flags |= Self::APPEND;
        }
        flags
    }

    pub fn truncate(&self) -> bool {
        self.contains(Self::TRUNCATE)
    }

    pub fn append(&self) -> bool {
        self.contains(Self::APPEND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// `SEEK_SET`, `SEEK_CUR`, `SEEK_END`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Start),
            1 => Some(Self::Current),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_bits_are_mapped() {
        let flags = OpenFlags::from_posix(0o2 | POSIX_O_TRUNC);
        assert!(flags.truncate());
        assert!(!flags.append());

        let flags = OpenFlags::from_posix(POSIX_O_APPEND | POSIX_O_TRUNC);
        assert!(flags.truncate() && flags.append());

        assert!(OpenFlags::from_posix(0o2).is_empty());
    }

    #[test]
    fn whence_from_raw() {
        assert_eq!(Whence::from_raw(2), Some(Whence::End));
        assert_eq!(Whence::from_raw(3), None);
    }
}
