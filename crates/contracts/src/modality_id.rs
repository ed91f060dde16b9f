//! ModalityId - shared key for one recorded stream
//!
//! Uses Arc<str> internally so ids can be handed to every resolver, cache key
//! and event without reallocating.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Identifier of a modality (one camera, one IMU, one insole, one skeleton
/// track) or of a shared offset group.
///
/// Ids are created once when the session blueprint is loaded and cloned on
/// every lookup afterwards, so cloning only bumps a reference count.
///
/// # Examples
/// ```
/// use contracts::ModalityId;
///
/// let id: ModalityId = "camera_1".into();
/// let id2 = id.clone();
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "camera_1");
/// ```
#[derive(Clone, Default)]
pub struct ModalityId(Arc<str>);

/// 名字不能作为模态或 offset 组键的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidName {
    Empty,
    Whitespace,
    /// `=` splits `key=value` edits, path separators would escape the
    /// frame export directory
    Reserved(char),
}

impl fmt::Display for InvalidName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("name is empty"),
            Self::Whitespace => f.write_str("name contains whitespace"),
            Self::Reserved(c) => write!(f, "name contains reserved character '{c}'"),
        }
    }
}

impl std::error::Error for InvalidName {}

impl ModalityId {
    const RESERVED: [char; 3] = ['=', '/', '\\'];

    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 检查名字能否作为模态 id 或组 id
    ///
    /// 同一个名字会出现在命令行 `key=value`、offset 记录的键和导出帧文件名中。
    pub fn check_name(name: &str) -> Result<(), InvalidName> {
        if name.is_empty() {
            return Err(InvalidName::Empty);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(InvalidName::Whitespace);
        }
        match name.chars().find(|c| Self::RESERVED.contains(c)) {
            Some(c) => Err(InvalidName::Reserved(c)),
            None => Ok(()),
        }
    }

    /// Checked constructor for names coming from users
    pub fn parse(name: &str) -> Result<Self, InvalidName> {
        Self::check_name(name)?;
        Ok(Self::new(name))
    }

    /// File stem of an exported frame, e.g. `camera_1_000042`
    pub fn frame_stem(&self, frame_index: usize) -> String {
        format!("{}_{:06}", self.0, frame_index)
    }
}

impl Deref for ModalityId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ModalityId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ModalityId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModalityId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ModalityId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for ModalityId {
    #[inline]
    fn from(s: &String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl fmt::Display for ModalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModalityId({:?})", self.0)
    }
}

impl PartialEq for ModalityId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for ModalityId {}

impl PartialEq<str> for ModalityId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for ModalityId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Ordered by name so reports and serialized maps come out stable.
impl PartialOrd for ModalityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModalityId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

// Must hash exactly like `str` so `HashMap<ModalityId, _>::get("cam")` works.
impl Hash for ModalityId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for ModalityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ModalityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
