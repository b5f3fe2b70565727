//! Size suffix parsing for derivative paths.
//!
//! A derivative path carries its crop box in a trailing token placed right
//! before the file extension:
//!
//! ```text
//! <stem>[-e<editor>]-<width>x<height>.<ext>
//!
//! photos/sunset-150x150.jpg     -> 150x150, no editor, master photos/sunset.jpg
//! photos/sunset-e2-150x150.jpg  -> 150x150, editor "2", master photos/sunset.jpg
//! ```
//!
//! The token is read right-to-left from the last `.` of the final path segment.
//! Anything that does not match the grammar exactly is not a thumbnail request.
//! Only the canonical spelling is accepted (lowercase `x`, no zero padding),
//! since that is the name the derivative is stored under.

/// Crop box parsed from a derivative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeSpec {
    /// Requested width in pixels (always > 0)
    pub width: u32,

    /// Requested height in pixels (always > 0)
    pub height: u32,

    /// Alternate resize strategy selected by `-e<id>`
    pub editor_id: Option<String>,

    /// The exact token that was matched, e.g. `-e2-150x150`
    pub crop_suffix: String,

    /// File extension without the dot, as written in the path
    pub extension: String,
}

impl SizeSpec {
    /// Rebuild the master path by removing the matched token.
    ///
    /// Only the occurrence that sits right before the extension is removed, so
    /// any identical text earlier in the path is preserved.
    pub fn master_path(&self, path: &str) -> Option<String> {
        let tail = format!("{}.{}", self.crop_suffix, self.extension);
        let start = path.rfind(&tail)?;
        let mut master = String::with_capacity(path.len() - self.crop_suffix.len());
        master.push_str(&path[..start]);
        master.push_str(&path[start + self.crop_suffix.len()..]);
        Some(master)
    }
}

/// Parse the size token from a path.
///
/// Returns `None` when the path is not a thumbnail request. That is not an
/// error: the caller passes the request through untouched.
pub fn parse_size_spec(path: &str) -> Option<SizeSpec> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let dot = file_name.rfind('.')?;
    let (stem, extension) = (&file_name[..dot], &file_name[dot + 1..]);

    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut cursor = Cursor::new(stem);

    let height = cursor.take_number()?;
    cursor.take_char(|c| c == 'x')?;
    let width = cursor.take_number()?;
    cursor.take_char(|c| c == '-')?;

    if width == 0 || height == 0 {
        return None;
    }

    // Optional `-e<digits>` in front of the box
    let editor_id = {
        let mut probe = cursor.clone();
        let id = probe.take_digits();
        let marked = id.is_some()
            && probe.take_char(|c| c == 'e').is_some()
            && probe.take_char(|c| c == '-').is_some();

        if marked {
            cursor = probe;
            id.map(str::to_string)
        } else {
            None
        }
    };

    // A derivative always has a master stem in front of its token
    if cursor.remaining().is_empty() {
        return None;
    }

    Some(SizeSpec {
        width,
        height,
        editor_id,
        crop_suffix: stem[cursor.end..].to_string(),
        extension: extension.to_string(),
    })
}

/// Right-to-left reader over a stem.
#[derive(Clone)]
struct Cursor<'a> {
    text: &'a str,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            end: text.len(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.text[..self.end]
    }

    fn take_char(&mut self, accept: impl Fn(char) -> bool) -> Option<char> {
        let c = self.remaining().chars().next_back()?;
        if !accept(c) {
            return None;
        }
        self.end -= c.len_utf8();
        Some(c)
    }

    fn take_digits(&mut self) -> Option<&'a str> {
        let rest = self.remaining();
        let start = rest
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        self.end = start;
        Some(&rest[start..])
    }

    /// Digits without zero padding.
    fn take_number(&mut self) -> Option<u32> {
        let digits = self.take_digits()?;
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok()
    }
}
