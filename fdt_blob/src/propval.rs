// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Property value encodings. Numbers are always stored as big-endian cells.

use std::ffi::CStr;

use crate::Error;
use crate::Result;

/// Conversion into an FDT property value.
pub trait ToFdtPropval {
    /// Encode `self` as raw property bytes.
    fn to_propval(self) -> Result<Vec<u8>>;
}

/// Conversion from an FDT property value.
pub trait FromFdtPropval: Sized {
    /// Decode raw property bytes, or `None` if they do not hold a `Self`.
    fn from_propval(propval: &[u8]) -> Option<Self>;
}

impl ToFdtPropval for () {
    fn to_propval(self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

impl FromFdtPropval for () {
    fn from_propval(propval: &[u8]) -> Option<Self> {
        propval.is_empty().then_some(())
    }
}

impl ToFdtPropval for &[u8] {
    fn to_propval(self) -> Result<Vec<u8>> {
        Ok(self.to_vec())
    }
}

impl<const N: usize> ToFdtPropval for &[u8; N] {
    fn to_propval(self) -> Result<Vec<u8>> {
        Ok(self.to_vec())
    }
}

impl ToFdtPropval for Vec<u8> {
    fn to_propval(self) -> Result<Vec<u8>> {
        Ok(self)
    }
}

impl FromFdtPropval for Vec<u8> {
    fn from_propval(propval: &[u8]) -> Option<Self> {
        Some(propval.to_vec())
    }
}

macro_rules! cell_propval {
    ($ty:ty) => {
        impl ToFdtPropval for $ty {
            fn to_propval(self) -> Result<Vec<u8>> {
                Ok(self.to_be_bytes().to_vec())
            }
        }

        impl ToFdtPropval for &[$ty] {
            fn to_propval(self) -> Result<Vec<u8>> {
                Ok(self.iter().flat_map(|v| v.to_be_bytes()).collect())
            }
        }

        impl<const N: usize> ToFdtPropval for [$ty; N] {
            fn to_propval(self) -> Result<Vec<u8>> {
                self.as_slice().to_propval()
            }
        }

        impl<const N: usize> ToFdtPropval for &[$ty; N] {
            fn to_propval(self) -> Result<Vec<u8>> {
                self.as_slice().to_propval()
            }
        }

        impl ToFdtPropval for Vec<$ty> {
            fn to_propval(self) -> Result<Vec<u8>> {
                self.as_slice().to_propval()
            }
        }

        impl FromFdtPropval for $ty {
            fn from_propval(propval: &[u8]) -> Option<Self> {
                Some(<$ty>::from_be_bytes(propval.try_into().ok()?))
            }
        }

        impl FromFdtPropval for Vec<$ty> {
            fn from_propval(propval: &[u8]) -> Option<Self> {
                let chunks = propval.chunks_exact(std::mem::size_of::<$ty>());
                if !chunks.remainder().is_empty() {
                    return None;
                }
                chunks
                    .map(|chunk| chunk.try_into().ok().map(<$ty>::from_be_bytes))
                    .collect()
            }
        }
    };
}

cell_propval!(u32);
cell_propval!(u64);

// Neither libfdt nor the kernel check that strings are printable; only NUL is forbidden.
fn strings_to_propval<T: AsRef<str>>(strings: &[T]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(strings.iter().map(|s| s.as_ref().len() + 1).sum());
    for s in strings {
        let s = s.as_ref();
        if s.contains('\0') {
            return Err(Error::InvalidString(s.to_string()));
        }
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
    }
    Ok(bytes)
}

impl ToFdtPropval for &str {
    fn to_propval(self) -> Result<Vec<u8>> {
        strings_to_propval(&[self])
    }
}

impl ToFdtPropval for String {
    fn to_propval(self) -> Result<Vec<u8>> {
        self.as_str().to_propval()
    }
}

impl ToFdtPropval for &[&str] {
    fn to_propval(self) -> Result<Vec<u8>> {
        strings_to_propval(self)
    }
}

impl<const N: usize> ToFdtPropval for &[&str; N] {
    fn to_propval(self) -> Result<Vec<u8>> {
        strings_to_propval(self)
    }
}

impl<const N: usize> ToFdtPropval for [&str; N] {
    fn to_propval(self) -> Result<Vec<u8>> {
        strings_to_propval(&self)
    }
}

impl ToFdtPropval for Vec<String> {
    fn to_propval(self) -> Result<Vec<u8>> {
        strings_to_propval(&self)
    }
}

impl FromFdtPropval for String {
    fn from_propval(propval: &[u8]) -> Option<Self> {
        let s = CStr::from_bytes_until_nul(propval).ok()?;
        s.to_str().ok().map(str::to_string)
    }
}

impl FromFdtPropval for Vec<String> {
    fn from_propval(propval: &[u8]) -> Option<Self> {
        let list = propval.strip_suffix(&[0])?;
        list.split(|&b| b == 0)
            .map(|s| String::from_utf8(s.to_vec()).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        assert_eq!(().to_propval().unwrap(), []);
        assert_eq!([7u8, 8, 9].to_propval().unwrap(), [7u8, 8, 9]);
        assert_eq!(0x40000000u32.to_propval().unwrap(), [0x40u8, 0, 0, 0]);
        assert_eq!(
            0x8_0000_1000u64.to_propval().unwrap(),
            [0u8, 0, 0, 0x08, 0, 0, 0x10, 0]
        );
        assert_eq!(
            [0u32, 0x25, 4].to_propval().unwrap(),
            [0u8, 0, 0, 0, 0, 0, 0, 0x25, 0, 0, 0, 4]
        );
        assert_eq!(
            vec![0x4000_0000u64, 0x1000_0000].to_propval().unwrap(),
            [0u8, 0, 0, 0, 0x40, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0]
        );
        assert_eq!("psci".to_propval().unwrap(), b"psci\0");
        assert_eq!(
            ["arm,gic-400", "arm,cortex-a15-gic"].to_propval().unwrap(),
            b"arm,gic-400\0arm,cortex-a15-gic\0"
        );
        assert!(matches!(
            "bad\0name".to_propval(),
            Err(Error::InvalidString(_))
        ));
        assert!(["ok", "bad\0"].to_propval().is_err());
    }

    #[test]
    fn decode() {
        assert_eq!(<()>::from_propval(&[]), Some(()));
        assert_eq!(<()>::from_propval(&[0]), None);
        assert_eq!(u32::from_propval(&[0, 0, 0x80, 0x01]), Some(0x8001));
        assert_eq!(u32::from_propval(&[0, 0, 0x80]), None);
        assert_eq!(u64::from_propval(&[0, 0, 0, 0, 0, 0, 0x10, 0]), Some(0x1000));
        assert_eq!(
            Vec::<u32>::from_propval(&[0, 0, 0, 1, 0, 0, 0, 0xd]),
            Some(vec![1, 0xd])
        );
        assert_eq!(Vec::<u32>::from_propval(&[0, 0, 0, 1, 0]), None);
        assert_eq!(Vec::<u64>::from_propval(&[0, 0, 0, 1]), None);
        assert_eq!(
            String::from_propval(b"okay\0"),
            Some("okay".to_string())
        );
        assert_eq!(String::from_propval(b"okay"), None);
        assert_eq!(
            Vec::<String>::from_propval(b"virtio,mmio\0shyper\0"),
            Some(vec!["virtio,mmio".to_string(), "shyper".to_string()])
        );
        assert_eq!(Vec::<String>::from_propval(b"virtio,mmio"), None);
    }
}
