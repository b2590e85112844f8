//! Output containers: flat COM binaries and MZ executables.

use crate::assembler::Label;
use crate::error::{AsmError, AsmErrorKind, Site};
use crate::parser::Param;
use pc8086_rs::isa::table::Directive;
use std::fmt;
use tracing::debug;

/// Stack reserved by an MZ image that does not say otherwise.
pub const DEFAULT_STACK: u32 = 4096;
pub const MZ_MAGIC: u16 = 0x5A4D;
/// Size of the fixed MZ header fields; the relocation table follows.
pub const MZ_FIELDS: usize = 0x1C;

/// An output container. The assembler emits a flat body; the format
/// decides what label values mean and wraps the body at the end.
pub trait Format: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether `directive` may appear in this format's source.
    fn accepts(&self, directive: Directive) -> bool;

    /// Run a format directive (ORG, SEGMENT, ENTRY, STACK, HEAP).
    fn apply(
        &mut self,
        site: Site,
        directive: Directive,
        params: &[Param],
        out: &mut Vec<u8>,
    ) -> Result<(), AsmErrorKind>;

    /// Address of output byte 0, used for the hex dump.
    fn origin(&self) -> u32;

    /// Absolute value of a label at body offset `pos`.
    fn address(&self, pos: usize) -> i64;

    /// Record that the word at body offset `at` holds the segment of `label`.
    fn relocate(&mut self, label: &str, at: usize) -> Result<(), AsmErrorKind>;

    /// Forget relocations so label resolution can be repeated.
    fn reset(&mut self);

    /// Final file image.
    fn finish(&self, body: &[u8], labels: &[Label]) -> (Vec<u8>, Vec<AsmError>);
}

/// Format selected by a `FORMAT` parameter.
pub fn by_name(name: &str) -> Option<Box<dyn Format>> {
    match name.to_ascii_lowercase().as_str() {
        "binary" | "com" => Some(Box::new(Com::default())),
        "mz" => Some(Box::new(Mz::default())),
        _ => None,
    }
}

/// The single numeric parameter of `directive`.
pub fn number(directive: Directive, params: &[Param]) -> Result<i64, AsmErrorKind> {
    match params {
        [Param::Number(n)] => Ok(n.value),
        [] => Err(AsmErrorKind::Params {
            directive,
            reason: "expects a value",
        }),
        [_] => Err(AsmErrorKind::Params {
            directive,
            reason: "expects a number",
        }),
        _ => Err(AsmErrorKind::Params {
            directive,
            reason: "expects exactly one value",
        }),
    }
}

fn word(directive: Directive, params: &[Param]) -> Result<u32, AsmErrorKind> {
    let v = number(directive, params)?;
    u16::try_from(v).map(u32::from).map_err(|_| AsmErrorKind::Params {
        directive,
        reason: "value must be 0..=FFFFh",
    })
}

fn is_data(directive: Directive) -> bool {
    directive.data_size().is_some() || directive.reserve_size().is_some()
}

fn paragraphs(bytes: usize) -> usize {
    bytes.div_ceil(16)
}

/// Flat binary loaded at `origin` (100h for DOS COM programs).
#[derive(Debug, Default)]
pub struct Com {
    origin: u32,
}

impl Format for Com {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn accepts(&self, directive: Directive) -> bool {
        matches!(directive, Directive::Format | Directive::Org) || is_data(directive)
    }

    fn apply(
        &mut self,
        _site: Site,
        directive: Directive,
        params: &[Param],
        _out: &mut Vec<u8>,
    ) -> Result<(), AsmErrorKind> {
        match directive {
            Directive::Org => {
                self.origin = word(directive, params)?;
                Ok(())
            }
            _ => Err(AsmErrorKind::NotInFormat {
                directive,
                format: self.name(),
            }),
        }
    }

    fn origin(&self) -> u32 {
        self.origin
    }

    fn address(&self, pos: usize) -> i64 {
        i64::from(self.origin) + pos as i64
    }

    fn relocate(&mut self, label: &str, _at: usize) -> Result<(), AsmErrorKind> {
        Err(AsmErrorKind::Relocation(label.to_string()))
    }

    fn reset(&mut self) {}

    fn finish(&self, body: &[u8], _labels: &[Label]) -> (Vec<u8>, Vec<AsmError>) {
        (body.to_vec(), Vec::new())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    segment: String,
    label: String,
    site: Site,
}

/// DOS MZ executable: paragraph-aligned segments, a relocation table for
/// every use of a segment value and a header describing the load.
#[derive(Debug, Default)]
pub struct Mz {
    segments: Vec<usize>,
    entry: Option<Entry>,
    stack: Option<u32>,
    heap: Option<u32>,
    relocations: Vec<(u16, u16)>,
}

impl Mz {
    fn segment_base(&self, pos: usize) -> usize {
        self.segments
            .iter()
            .rev()
            .find(|start| **start <= pos)
            .copied()
            .unwrap_or(0)
    }

    pub fn relocations(&self) -> &[(u16, u16)] {
        &self.relocations
    }

    fn entry_point(&self, labels: &[Label]) -> Result<(u16, u16), AsmError> {
        let Some(entry) = &self.entry else {
            return Ok((0, 0));
        };
        let find = |name: &str| {
            let mut hits = labels.iter().filter(|l| l.name == name);
            match (hits.next(), hits.next()) {
                (Some(l), None) => Ok(l),
                (None, _) => Err(AsmErrorKind::UnknownLabel(name.to_string())),
                _ => Err(AsmErrorKind::AmbiguousLabel(name.to_string())),
            }
        };
        let err = |kind| AsmError::new(entry.site, kind);
        let segment = find(&entry.segment).map_err(err)?;
        if !segment.segment {
            return Err(err(AsmErrorKind::NotASegment(entry.segment.clone())));
        }
        let target = find(&entry.label).map_err(err)?;
        Ok(((segment.pos / 16) as u16, self.address(target.pos) as u16))
    }

    /// Header for a file of `total` bytes.
    fn header(&self, total: usize, image: usize, cs: u16, ip: u16) -> Vec<u8> {
        let size = (MZ_FIELDS + 4 * self.relocations.len()).next_multiple_of(16);
        let stack = self.stack.unwrap_or(DEFAULT_STACK) as usize;
        let min_extra = paragraphs(stack);
        let max_extra = self
            .heap
            .map_or(0xFFFF, |h| (min_extra + paragraphs(h as usize)).min(0xFFFF));
        let fields = [
            MZ_MAGIC,
            (total % 512) as u16,
            total.div_ceil(512) as u16,
            self.relocations.len() as u16,
            (size / 16) as u16,
            min_extra as u16,
            max_extra as u16,
            paragraphs(image) as u16,
            stack as u16,
            0,
            ip,
            cs,
            MZ_FIELDS as u16,
            0,
        ];
        let mut out: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
        for (offset, segment) in &self.relocations {
            out.extend(offset.to_le_bytes());
            out.extend(segment.to_le_bytes());
        }
        out.resize(size, 0);
        out
    }
}

impl Format for Mz {
    fn name(&self) -> &'static str {
        "MZ"
    }

    fn accepts(&self, directive: Directive) -> bool {
        matches!(
            directive,
            Directive::Format | Directive::Segment | Directive::Entry | Directive::Stack | Directive::Heap
        ) || is_data(directive)
    }

    fn apply(
        &mut self,
        site: Site,
        directive: Directive,
        params: &[Param],
        out: &mut Vec<u8>,
    ) -> Result<(), AsmErrorKind> {
        match (directive, params) {
            (Directive::Segment, [Param::Label(name)]) => {
                out.resize(out.len().next_multiple_of(16), 0);
                debug!(segment = %name, start = out.len(), "MZ segment");
                self.segments.push(out.len());
                Ok(())
            }
            (Directive::Segment, _) => Err(AsmErrorKind::Params {
                directive,
                reason: "expects a segment name",
            }),
            (Directive::Entry, [Param::Far(segment, label)]) => {
                self.entry = Some(Entry {
                    segment: segment.clone(),
                    label: label.clone(),
                    site,
                });
                Ok(())
            }
            (Directive::Entry, _) => Err(AsmErrorKind::Params {
                directive,
                reason: "expects segment:label",
            }),
            (Directive::Stack, _) => {
                self.stack = Some(word(directive, params)?);
                Ok(())
            }
            (Directive::Heap, _) => {
                self.heap = Some(word(directive, params)?);
                Ok(())
            }
            _ => Err(AsmErrorKind::NotInFormat {
                directive,
                format: self.name(),
            }),
        }
    }

    fn origin(&self) -> u32 {
        0
    }

    fn address(&self, pos: usize) -> i64 {
        (pos - self.segment_base(pos)) as i64
    }

    fn relocate(&mut self, _label: &str, at: usize) -> Result<(), AsmErrorKind> {
        let base = self.segment_base(at);
        self.relocations.push(((at - base) as u16, (base / 16) as u16));
        Ok(())
    }

    fn reset(&mut self) {
        self.relocations.clear();
    }

    fn finish(&self, body: &[u8], labels: &[Label]) -> (Vec<u8>, Vec<AsmError>) {
        let mut errors = Vec::new();
        let (cs, ip) = self.entry_point(labels).unwrap_or_else(|e| {
            errors.push(e);
            (0, 0)
        });
        // the page count covers the header itself: size it, then fill it in
        let mut header = Vec::new();
        for _ in 0..2 {
            header = self.header(body.len() + header.len(), body.len(), cs, ip);
        }
        debug!(header = header.len(), body = body.len(), relocations = self.relocations.len(), "MZ image");
        header.extend_from_slice(body);
        (header, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc8086_rs::isa::operand::Immediate;

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    #[test]
    fn com_directives() {
        let mut com = Com::default();
        assert!(com.accepts(Directive::Org));
        assert!(com.accepts(Directive::Rb));
        assert!(!com.accepts(Directive::Segment));
        com.apply(Site::default(), Directive::Org, &[Param::Number(Immediate::new(0x100))], &mut Vec::new())
            .unwrap();
        assert_eq!(com.address(3), 0x103);
        assert!(com.relocate("x", 0).is_err());
        assert!(matches!(
            com.apply(Site::default(), Directive::Org, &[], &mut Vec::new()),
            Err(AsmErrorKind::Params { .. })
        ));
    }

    #[test]
    fn mz_header_fields() {
        let mut mz = Mz::default();
        let mut out = vec![0x90; 5];
        mz.apply(Site::default(), Directive::Segment, &[Param::Label("data".into())], &mut out)
            .unwrap();
        assert_eq!(out.len(), 16);
        out.extend([0; 4]);
        mz.relocate("data", 17).unwrap();
        assert_eq!(mz.relocations(), &[(1, 1)]);
        assert_eq!(mz.address(18), 2);

        let (image, errors) = mz.finish(&out, &[]);
        assert!(errors.is_empty());
        assert_eq!(u16_at(&image, 0x00), MZ_MAGIC);
        assert_eq!(u16_at(&image, 0x02), 32 + 20);
        assert_eq!(u16_at(&image, 0x04), 1);
        assert_eq!(u16_at(&image, 0x06), 1);
        assert_eq!(u16_at(&image, 0x08), 2);
        assert_eq!(u16_at(&image, 0x0A), 256);
        assert_eq!(u16_at(&image, 0x0E), 2);
        assert_eq!(u16_at(&image, 0x10), 4096);
        assert_eq!(u16_at(&image, 0x18), 0x1C);
        assert_eq!(u16_at(&image, 0x1C), 1);
        assert_eq!(u16_at(&image, 0x1E), 1);
        assert_eq!(image.len(), 32 + 20);
    }
}
