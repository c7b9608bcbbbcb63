//! Container handle and open pipeline.
//!
//! Open path, in order: validate the preamble and header (`validate`),
//! materialize a canonical body buffer (`body`), upgrade v1 type records to
//! the current encoding (`upgrade`), byte-swap foreign-endian bodies
//! (`flip`), build the type indexes (`index`), and translate the optional
//! symbol table (`symtab`). Every step defends against corrupt input; any
//! failure aborts the open with no partial handle.

mod body;
mod dump;
mod flip;
mod index;
mod symtab;
mod upgrade;
mod validate;

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod upgrade_tests;

use std::borrow::Cow;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use typecask_format::kind::Kind;
use typecask_format::preamble::{Header, VERSION_1, VERSION_2};
use typecask_format::record::{
    ArrayInfo, Enumerators, Members, Params, RecordHeader, SliceInfo, forward_tag_kind,
};
use typecask_format::{FormatError, strtab};

pub use dump::dump;
pub use symtab::{DataModel, SymtabSource};

/// Numeric type id. Id 0 is reserved and never refers to a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Lookup namespace for [`Container::lookup_type_by_name`].
///
/// Structs, unions and enums each get their own namespace; every other
/// named kind (integer, float, function, typedef, pointer, volatile, const,
/// restrict) shares one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Struct,
    Union,
    Enum,
    Other,
}

/// In-memory format state, resolved once at open time and threaded through
/// the pipeline instead of being dispatched through ambient tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    /// On-disk v2: current record encoding, short header.
    V2,
    /// On-disk v3: current record encoding, long header.
    V3,
    /// Upgraded in memory from on-disk v1. Distinct from `V3` so the id
    /// boundary keeps the historical low value that sibling containers
    /// already baked into their references.
    V1Upgraded,
}

impl FormatVersion {
    /// Highest type id on the parent side of the id space. The boundary is a
    /// contiguous bit mask, so it doubles as the id-to-index mask.
    pub fn id_boundary(self) -> u32 {
        match self {
            Self::V1Upgraded => 0x7FFF,
            Self::V2 | Self::V3 => 0x7FFF_FFFF,
        }
    }
}

pub(crate) fn id_to_index(id: u32, boundary: u32) -> u32 {
    id & boundary
}

pub(crate) fn same_side(id: u32, boundary: u32, child: bool) -> bool {
    (id > boundary) == child
}

/// Error reported by a pluggable [`Decompress`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct DecompressError(pub String);

/// Caller-supplied decompression primitive.
pub trait Decompress {
    /// Inflate `input`; the caller knows the output must be exactly
    /// `expected_len` bytes and will reject anything else as corrupt.
    fn decompress(&self, input: &[u8], expected_len: usize)
    -> Result<Vec<u8>, DecompressError>;
}

/// Errors fatal to [`Container::open`]. There is no partial container.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpenError {
    /// Bad magic: the buffer is some other format entirely.
    #[error("not a typecask container")]
    NotThisFormat,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("container truncated: need {need} bytes, have {have}")]
    TooSmall { need: usize, have: usize },

    #[error("corrupt container: {0}")]
    Corrupt(#[from] FormatError),

    #[error("container body is compressed but no decompressor was supplied")]
    NoDecompressor,

    #[error("decompression failed: {0}")]
    DecompressFailed(#[from] DecompressError),

    #[error("out of memory sizing type tables")]
    OutOfMemory,
}

/// Errors from queries against an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The query needs a symbol table that was never supplied at open time.
    #[error("no symbol table was loaded with this container")]
    NotLoaded,
}

/// Everything needed to open a container.
#[derive(Default)]
pub struct OpenOptions<'a, 'd> {
    /// Symbol and string table from the host object file. Without them,
    /// symbol-to-type queries fail with [`QueryError::NotLoaded`].
    pub symtab: Option<SymtabSource<'a>>,
    /// Decompressor for containers with the compressed flag set.
    pub decompressor: Option<&'d dyn Decompress>,
    /// Parent container this one was compiled against. Held alive for as
    /// long as this container exists.
    pub parent: Option<Arc<Container<'a>>>,
}

/// An open, immutable container.
///
/// Owns every buffer it allocated and borrows the caller's memory only when
/// no transformation was needed. All queries take `&self`; the handle is
/// safe to share across threads once open. Dropping it releases owned
/// buffers and the reference it holds on its parent.
pub struct Container<'a> {
    body: Cow<'a, [u8]>,
    header: Header,
    version: FormatVersion,
    model: DataModel,
    child: bool,
    typemax: u32,
    /// Id-to-byte-offset translation, indexed by type index; slot 0 unused.
    type_offsets: Vec<u32>,
    /// `ptrtab[i]` is the index of a pointer type targeting index `i`.
    ptrtab: Vec<u32>,
    structs: IndexMap<String, u32>,
    unions: IndexMap<String, u32>,
    enums: IndexMap<String, u32>,
    names: IndexMap<String, u32>,
    symtab_map: Option<Vec<Option<u32>>>,
    parent: Option<Arc<Container<'a>>>,
}

impl<'a> Container<'a> {
    /// Open a container with no symbol table and no decompressor.
    pub fn open(data: &'a [u8]) -> Result<Self, OpenError> {
        Self::open_with(data, OpenOptions::default())
    }

    /// Open a container.
    pub fn open_with(data: &'a [u8], opts: OpenOptions<'a, '_>) -> Result<Self, OpenError> {
        let validated = validate::validate(data)?;
        let mut body = body::materialize(data, &validated, opts.decompressor)?;
        let mut header = validated.header;

        let version = match validated.disk_version {
            VERSION_1 => {
                let (upgraded, new_header) = upgrade::upgrade(&body, &header)?;
                debug!(
                    "upgraded v1 container: {} -> {} body bytes",
                    body.len(),
                    upgraded.len()
                );
                body = Cow::Owned(upgraded);
                header = new_header;
                FormatVersion::V1Upgraded
            }
            VERSION_2 => FormatVersion::V2,
            _ => FormatVersion::V3,
        };

        if validated.foreign {
            // The body was copied during materialization; records are in the
            // current encoding by now, which is what the flip walks.
            flip::flip_body(body.to_mut(), &header)?;
        }

        let child = opts.parent.is_some();
        let index = index::build(&body, &header, version, child)?;

        let (symtab_map, model) = match &opts.symtab {
            Some(src) => {
                let (map, model) = symtab::translate(src, &header, &body)?;
                (Some(map), model)
            }
            None => (None, DataModel::Native),
        };

        debug!(
            "opened container: {:?}, {} types, symtab {}",
            version,
            index.typemax,
            if symtab_map.is_some() { "yes" } else { "no" },
        );

        Ok(Container {
            body,
            header,
            version,
            model,
            child,
            typemax: index.typemax,
            type_offsets: index.type_offsets,
            ptrtab: index.ptrtab,
            structs: index.structs,
            unions: index.unions,
            enums: index.enums,
            names: index.names,
            symtab_map,
            parent: opts.parent,
        })
    }

    /// Look up a type id by name in the given namespace.
    pub fn lookup_type_by_name(&self, ns: Namespace, name: &str) -> Option<TypeId> {
        let map = match ns {
            Namespace::Struct => &self.structs,
            Namespace::Union => &self.unions,
            Namespace::Enum => &self.enums,
            Namespace::Other => &self.names,
        };
        map.get(name).map(|&idx| TypeId(self.index_to_id(idx)))
    }

    /// Decode the type record for `id`, if it refers to a type.
    ///
    /// Ids on the other side of the id boundary are resolved through the
    /// parent container when one is attached.
    pub fn type_at(&self, id: TypeId) -> Option<TypeView<'_>> {
        if !same_side(id.0, self.id_boundary(), self.child) {
            return self.parent.as_ref()?.type_at(id);
        }
        let idx = id_to_index(id.0, self.id_boundary());
        if idx == 0 || idx > self.typemax {
            return None;
        }
        let off = self.type_offsets[idx as usize] as usize;
        let type_end = self.header.str_off as usize;
        let rec = RecordHeader::decode(&self.body[off..type_end]).ok()?;
        let trailing_len = rec.trailing_len().ok()?;
        let start = off + rec.header_len;
        Some(TypeView {
            rec,
            trailing: &self.body[start..start + trailing_len],
            strings: self.strings(),
            id,
        })
    }

    /// Id of a pointer type targeting `id`, if any was recorded.
    pub fn pointer_to(&self, id: TypeId) -> Option<TypeId> {
        if !same_side(id.0, self.id_boundary(), self.child) {
            return self.parent.as_ref()?.pointer_to(id);
        }
        let idx = id_to_index(id.0, self.id_boundary());
        if idx == 0 || idx > self.typemax {
            return None;
        }
        let ptr_idx = self.ptrtab[idx as usize];
        (ptr_idx != 0).then(|| TypeId(self.index_to_id(ptr_idx)))
    }

    /// Byte offset into the object/function sub-sections for symbol
    /// `index`, or `None` when the symbol has no type information.
    pub fn symbol_type_offset(&self, index: usize) -> Result<Option<u32>, QueryError> {
        let map = self.symtab_map.as_ref().ok_or(QueryError::NotLoaded)?;
        Ok(map.get(index).copied().flatten())
    }

    /// Data model inferred from the symbol entry width.
    pub fn model(&self) -> DataModel {
        self.model
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Number of type records.
    pub fn type_count(&self) -> u32 {
        self.typemax
    }

    /// Compilation unit name, when the producer recorded one.
    pub fn cu_name(&self) -> Option<&str> {
        self.header_string(self.header.cu_name_ref)
    }

    /// Name of the parent container this one was compiled against.
    pub fn parent_name(&self) -> Option<&str> {
        self.header_string(self.header.parent_name_ref)
    }

    /// Label within the parent container this one was compiled against.
    pub fn parent_label(&self) -> Option<&str> {
        self.header_string(self.header.parent_label_ref)
    }

    /// The attached parent container, if any.
    pub fn parent(&self) -> Option<&Arc<Container<'a>>> {
        self.parent.as_ref()
    }

    /// Iterate the label section.
    pub fn labels(&self) -> impl Iterator<Item = LabelEntry<'_>> + '_ {
        let range = self.header.label_off as usize..self.header.obj_off as usize;
        self.pairs(range)
            .map(|(name_ref, id)| LabelEntry {
                name: strtab::string_at(self.strings(), name_ref).unwrap_or(""),
                last_type: TypeId(id),
            })
    }

    /// Iterate the variable section.
    pub fn variables(&self) -> impl Iterator<Item = VarEntry<'_>> + '_ {
        let range = self.header.var_off as usize..self.header.type_off as usize;
        self.pairs(range).map(|(name_ref, id)| VarEntry {
            name: strtab::string_at(self.strings(), name_ref).unwrap_or(""),
            type_id: TypeId(id),
        })
    }

    fn pairs(&self, range: std::ops::Range<usize>) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.body[range].chunks_exact(8).map(|pair| {
            (
                u32::from_ne_bytes([pair[0], pair[1], pair[2], pair[3]]),
                u32::from_ne_bytes([pair[4], pair[5], pair[6], pair[7]]),
            )
        })
    }

    fn header_string(&self, name_ref: u32) -> Option<&str> {
        if name_ref == 0 {
            return None;
        }
        strtab::string_at(self.strings(), name_ref).filter(|s| !s.is_empty())
    }

    fn strings(&self) -> &[u8] {
        &self.body[self.header.str_off as usize..]
    }

    fn id_boundary(&self) -> u32 {
        self.version.id_boundary()
    }

    fn index_to_id(&self, index: u32) -> u32 {
        if self.child {
            index | (self.id_boundary() + 1)
        } else {
            index
        }
    }
}

/// Entry in the label section: a named snapshot of the type table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelEntry<'c> {
    pub name: &'c str,
    /// Last type id covered by this label.
    pub last_type: TypeId,
}

/// Entry in the variable section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarEntry<'c> {
    pub name: &'c str,
    pub type_id: TypeId,
}

/// Decoded view of one type record.
///
/// Trailing entries are decoded lazily from the record's bytes; nothing is
/// copied out of the body buffer.
#[derive(Clone, Copy)]
pub struct TypeView<'c> {
    rec: RecordHeader,
    trailing: &'c [u8],
    strings: &'c [u8],
    id: TypeId,
}

impl<'c> TypeView<'c> {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.rec.info.kind
    }

    /// Whether the type is visible to top-level name lookup.
    pub fn is_root(&self) -> bool {
        self.rec.info.is_root
    }

    pub fn vlen(&self) -> u32 {
        self.rec.info.vlen
    }

    /// Size in bytes. Meaningful only for kinds that carry a size.
    pub fn size(&self) -> u64 {
        self.rec.size
    }

    /// Type name; empty for anonymous types.
    pub fn name(&self) -> &'c str {
        strtab::string_at(self.strings, self.rec.name).unwrap_or("")
    }

    /// Resolve a string ref from this record's trailing entries.
    pub fn string(&self, name_ref: u32) -> &'c str {
        strtab::string_at(self.strings, name_ref).unwrap_or("")
    }

    /// The wrapped type for simple wrappers, or the return type for
    /// functions.
    pub fn referenced_type(&self) -> Option<TypeId> {
        self.kind()
            .references_type()
            .then(|| TypeId(self.rec.size_or_type))
    }

    /// Tag kind declared by a Forward record.
    pub fn forward_tag(&self) -> Option<Kind> {
        (self.kind() == Kind::Forward).then(|| forward_tag_kind(self.rec.size_or_type))
    }

    /// Struct or union members.
    pub fn members(&self) -> Option<Members<'c>> {
        use typecask_format::record::LSTRUCT_THRESHOLD;
        self.kind()
            .is_composite()
            .then(|| Members::new(self.trailing, self.rec.size >= LSTRUCT_THRESHOLD))
    }

    /// Enum enumerators.
    pub fn enumerators(&self) -> Option<Enumerators<'c>> {
        (self.kind() == Kind::Enum).then(|| Enumerators::new(self.trailing))
    }

    /// Function parameter type ids.
    pub fn params(&self) -> Option<Params<'c>> {
        (self.kind() == Kind::Function).then(|| Params::new(self.trailing))
    }

    /// Array descriptor.
    pub fn array(&self) -> Option<ArrayInfo> {
        (self.kind() == Kind::Array).then(|| ArrayInfo::from_bytes(self.trailing))
    }

    /// Slice descriptor.
    pub fn slice(&self) -> Option<SliceInfo> {
        (self.kind() == Kind::Slice).then(|| SliceInfo::from_bytes(self.trailing))
    }

    /// The integer/float encoding word.
    pub fn encoding(&self) -> Option<u32> {
        matches!(self.kind(), Kind::Integer | Kind::Float).then(|| {
            u32::from_ne_bytes([
                self.trailing[0],
                self.trailing[1],
                self.trailing[2],
                self.trailing[3],
            ])
        })
    }
}
