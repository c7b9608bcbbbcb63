//! Byte-level fixture builders for container and symbol-table tests.
//!
//! `CaskBuilder` assembles complete container images in any on-disk
//! version; `SymtabBuilder` assembles ELF32/ELF64 symbol tables with their
//! own string table. Everything is emitted in native byte order;
//! `byte_swapped` turns a finished current-version image into its
//! foreign-endian twin.

use typecask_format::compat::{
    V1_LSIZE_SENTINEL, V1_LSTRUCT_THRESHOLD, pack_info_v1,
};
use typecask_format::kind::Kind;
use typecask_format::preamble::{
    HEADER_SIZE, LEGACY_HEADER_SIZE, MAGIC, PREAMBLE_SIZE, VERSION_3,
};
use typecask_format::record::{LSIZE_SENTINEL, LSTRUCT_THRESHOLD, MAX_SMALL_SIZE, pack_info};

use super::SymtabSource;
use super::flip::flip_body;

pub(super) const STT_OBJECT: u8 = 1;
pub(super) const STT_FUNC: u8 = 2;
pub(super) const STT_SECTION: u8 = 3;
pub(super) const SHN_UNDEF: u16 = 0;
pub(super) const SHN_ABS: u16 = 0xfff1;
/// Arbitrary regular section index for fixture symbols.
pub(super) const SHN_DATA: u16 = 2;

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

pub(super) struct CaskBuilder {
    version: u16,
    parent_label_ref: u32,
    parent_name_ref: u32,
    cu_name_ref: u32,
    strings: Vec<u8>,
    labels: Vec<u8>,
    objects: Vec<u8>,
    functions: Vec<u8>,
    obj_index: Vec<u8>,
    func_index: Vec<u8>,
    variables: Vec<u8>,
    types: Vec<u8>,
    ntypes: u32,
}

impl CaskBuilder {
    pub fn new() -> Self {
        Self::with_version(VERSION_3)
    }

    pub fn with_version(version: u16) -> Self {
        Self {
            version,
            parent_label_ref: 0,
            parent_name_ref: 0,
            cu_name_ref: 0,
            // Offset 0 is the empty string.
            strings: vec![0],
            labels: Vec::new(),
            objects: Vec::new(),
            functions: Vec::new(),
            obj_index: Vec::new(),
            func_index: Vec::new(),
            variables: Vec::new(),
            types: Vec::new(),
            ntypes: 0,
        }
    }

    pub fn add_string(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        off
    }

    pub fn set_cu_name(&mut self, name: &str) {
        self.cu_name_ref = self.add_string(name);
    }

    pub fn set_parent(&mut self, name: &str, label: &str) {
        self.parent_name_ref = self.add_string(name);
        self.parent_label_ref = self.add_string(label);
    }

    pub fn add_label(&mut self, name: &str, last_type: u32) {
        let name_ref = self.add_string(name);
        push_u32(&mut self.labels, name_ref);
        push_u32(&mut self.labels, last_type);
    }

    pub fn add_object(&mut self, type_id: u32) {
        push_u32(&mut self.objects, type_id);
    }

    pub fn add_function_entry(&mut self, return_type: u32, params: &[u32]) {
        push_u32(
            &mut self.functions,
            pack_info(Kind::Function, false, params.len() as u32),
        );
        push_u32(&mut self.functions, return_type);
        for &p in params {
            push_u32(&mut self.functions, p);
        }
    }

    pub fn add_function_pad(&mut self) {
        push_u32(&mut self.functions, pack_info(Kind::Unknown, false, 0));
    }

    pub fn add_variable(&mut self, name: &str, type_id: u32) {
        let name_ref = self.add_string(name);
        push_u32(&mut self.variables, name_ref);
        push_u32(&mut self.variables, type_id);
    }

    // Current-encoding type emitters. Each returns the assigned type id.

    fn begin_type(&mut self, name: &str, kind: Kind, is_root: bool, vlen: u32, field: u32) -> u32 {
        let name_ref = self.add_string(name);
        push_u32(&mut self.types, name_ref);
        push_u32(&mut self.types, pack_info(kind, is_root, vlen));
        push_u32(&mut self.types, field);
        self.ntypes += 1;
        self.ntypes
    }

    fn begin_sized_type(
        &mut self,
        name: &str,
        kind: Kind,
        is_root: bool,
        vlen: u32,
        size: u64,
    ) -> u32 {
        if size > MAX_SMALL_SIZE {
            let id = self.begin_type(name, kind, is_root, vlen, LSIZE_SENTINEL);
            push_u32(&mut self.types, (size >> 32) as u32);
            push_u32(&mut self.types, size as u32);
            id
        } else {
            self.begin_type(name, kind, is_root, vlen, size as u32)
        }
    }

    pub fn add_integer(&mut self, name: &str, is_root: bool, size: u64, encoding: u32) -> u32 {
        let id = self.begin_sized_type(name, Kind::Integer, is_root, 0, size);
        push_u32(&mut self.types, encoding);
        id
    }

    pub fn add_float(&mut self, name: &str, is_root: bool, size: u64, encoding: u32) -> u32 {
        let id = self.begin_sized_type(name, Kind::Float, is_root, 0, size);
        push_u32(&mut self.types, encoding);
        id
    }

    pub fn add_pointer(&mut self, target: u32) -> u32 {
        self.begin_type("", Kind::Pointer, false, 0, target)
    }

    pub fn add_wrapper(&mut self, kind: Kind, name: &str, target: u32) -> u32 {
        self.begin_type(name, kind, false, 0, target)
    }

    pub fn add_function_type(&mut self, name: &str, return_type: u32, params: &[u32]) -> u32 {
        let id = self.begin_type(name, Kind::Function, true, params.len() as u32, return_type);
        for &p in params {
            push_u32(&mut self.types, p);
        }
        id
    }

    pub fn add_array(&mut self, elem_type: u32, index_type: u32, count: u32) -> u32 {
        let id = self.begin_sized_type("", Kind::Array, false, 1, 0);
        push_u32(&mut self.types, elem_type);
        push_u32(&mut self.types, index_type);
        push_u32(&mut self.types, count);
        id
    }

    pub fn add_slice(&mut self, type_id: u32, offset: u16, bits: u16) -> u32 {
        let id = self.begin_sized_type("", Kind::Slice, false, 0, 0);
        push_u32(&mut self.types, type_id);
        push_u16(&mut self.types, offset);
        push_u16(&mut self.types, bits);
        id
    }

    pub fn add_enum(&mut self, name: &str, enumerators: &[(&str, i32)]) -> u32 {
        let refs: Vec<u32> = enumerators.iter().map(|(n, _)| self.add_string(n)).collect();
        let id = self.begin_sized_type(name, Kind::Enum, true, enumerators.len() as u32, 4);
        for (name_ref, (_, value)) in refs.into_iter().zip(enumerators) {
            push_u32(&mut self.types, name_ref);
            push_u32(&mut self.types, *value as u32);
        }
        id
    }

    /// Struct or union with `(name, type, bit offset)` members. The member
    /// encoding follows the long-member threshold on `size`.
    pub fn add_composite(
        &mut self,
        kind: Kind,
        name: &str,
        size: u64,
        members: &[(&str, u32, u64)],
    ) -> u32 {
        let refs: Vec<u32> = members.iter().map(|(n, _, _)| self.add_string(n)).collect();
        let id = self.begin_sized_type(name, kind, true, members.len() as u32, size);
        let wide = size >= LSTRUCT_THRESHOLD;
        for (name_ref, (_, type_id, offset)) in refs.into_iter().zip(members) {
            push_u32(&mut self.types, name_ref);
            push_u32(&mut self.types, *type_id);
            if wide {
                push_u32(&mut self.types, (*offset >> 32) as u32);
                push_u32(&mut self.types, *offset as u32);
            } else {
                push_u32(&mut self.types, *offset as u32);
            }
        }
        id
    }

    pub fn add_forward(&mut self, name: &str, tag: u32) -> u32 {
        self.begin_type(name, Kind::Forward, true, 0, tag)
    }

    pub fn add_unknown(&mut self) -> u32 {
        self.begin_sized_type("", Kind::Unknown, false, 0, 0)
    }

    // v1 type emitters, for upgrade fixtures.

    fn begin_type_v1(&mut self, name: &str, kind: Kind, is_root: bool, vlen: u16, field: u16) -> u32 {
        let name_ref = self.add_string(name);
        push_u32(&mut self.types, name_ref);
        push_u16(&mut self.types, pack_info_v1(kind, is_root, vlen));
        push_u16(&mut self.types, field);
        self.ntypes += 1;
        self.ntypes
    }

    fn begin_sized_type_v1(
        &mut self,
        name: &str,
        kind: Kind,
        is_root: bool,
        vlen: u16,
        size: u64,
    ) -> u32 {
        if size >= u64::from(V1_LSIZE_SENTINEL) {
            let id = self.begin_type_v1(name, kind, is_root, vlen, V1_LSIZE_SENTINEL);
            push_u32(&mut self.types, (size >> 32) as u32);
            push_u32(&mut self.types, size as u32);
            id
        } else {
            self.begin_type_v1(name, kind, is_root, vlen, size as u16)
        }
    }

    pub fn add_integer_v1(&mut self, name: &str, is_root: bool, size: u64, encoding: u32) -> u32 {
        let id = self.begin_sized_type_v1(name, Kind::Integer, is_root, 0, size);
        push_u32(&mut self.types, encoding);
        id
    }

    pub fn add_pointer_v1(&mut self, target: u16) -> u32 {
        self.begin_type_v1("", Kind::Pointer, false, 0, target)
    }

    pub fn add_function_v1(&mut self, name: &str, return_type: u16, params: &[u16]) -> u32 {
        let id = self.begin_type_v1(name, Kind::Function, true, params.len() as u16, return_type);
        for &p in params {
            push_u16(&mut self.types, p);
        }
        if params.len() % 2 == 1 {
            push_u16(&mut self.types, 0);
        }
        id
    }

    pub fn add_array_v1(&mut self, elem_type: u16, index_type: u16, count: u32) -> u32 {
        let id = self.begin_sized_type_v1("", Kind::Array, false, 1, 0);
        push_u16(&mut self.types, elem_type);
        push_u16(&mut self.types, index_type);
        push_u32(&mut self.types, count);
        id
    }

    pub fn add_enum_v1(&mut self, name: &str, enumerators: &[(&str, i32)]) -> u32 {
        let refs: Vec<u32> = enumerators.iter().map(|(n, _)| self.add_string(n)).collect();
        let id = self.begin_sized_type_v1(name, Kind::Enum, true, enumerators.len() as u16, 4);
        for (name_ref, (_, value)) in refs.into_iter().zip(enumerators) {
            push_u32(&mut self.types, name_ref);
            push_u32(&mut self.types, *value as u32);
        }
        id
    }

    pub fn add_composite_v1(
        &mut self,
        kind: Kind,
        name: &str,
        size: u64,
        members: &[(&str, u16, u64)],
    ) -> u32 {
        let refs: Vec<u32> = members.iter().map(|(n, _, _)| self.add_string(n)).collect();
        let id = self.begin_sized_type_v1(name, kind, true, members.len() as u16, size);
        let wide = size >= V1_LSTRUCT_THRESHOLD;
        for (name_ref, (_, type_id, offset)) in refs.into_iter().zip(members) {
            push_u32(&mut self.types, name_ref);
            push_u16(&mut self.types, *type_id);
            if wide {
                push_u16(&mut self.types, 0);
                push_u32(&mut self.types, (*offset >> 32) as u32);
                push_u32(&mut self.types, *offset as u32);
            } else {
                push_u16(&mut self.types, *offset as u16);
            }
        }
        id
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_flags(0)
    }

    /// Same image with the compressed flag set; the body bytes are emitted
    /// verbatim, so tests pair this with an identity decompressor.
    pub fn build_compressed(&self) -> Vec<u8> {
        self.build_with_flags(typecask_format::preamble::FLAG_COMPRESSED)
    }

    fn build_with_flags(&self, flags: u16) -> Vec<u8> {
        let label_off = 0u32;
        let obj_off = label_off + self.labels.len() as u32;
        let func_off = obj_off + self.objects.len() as u32;
        let obj_index_off = func_off + self.functions.len() as u32;
        let func_index_off = obj_index_off + self.obj_index.len() as u32;
        let var_off = func_index_off + self.func_index.len() as u32;
        let type_off = var_off + self.variables.len() as u32;
        let str_off = type_off + self.types.len() as u32;
        assert_eq!(type_off % 4, 0, "fixture type section misaligned");

        let header_size = if self.version == VERSION_3 {
            HEADER_SIZE
        } else {
            LEGACY_HEADER_SIZE
        };
        let mut out = Vec::with_capacity(PREAMBLE_SIZE + header_size);

        push_u16(&mut out, MAGIC);
        push_u16(&mut out, self.version);
        push_u16(&mut out, flags);
        push_u16(&mut out, 0);

        push_u32(&mut out, self.parent_label_ref);
        push_u32(&mut out, self.parent_name_ref);
        if self.version == VERSION_3 {
            push_u32(&mut out, self.cu_name_ref);
        }
        push_u32(&mut out, label_off);
        push_u32(&mut out, obj_off);
        push_u32(&mut out, func_off);
        if self.version == VERSION_3 {
            push_u32(&mut out, obj_index_off);
            push_u32(&mut out, func_index_off);
        }
        push_u32(&mut out, var_off);
        push_u32(&mut out, type_off);
        push_u32(&mut out, str_off);
        push_u32(&mut out, self.strings.len() as u32);

        out.extend_from_slice(&self.labels);
        out.extend_from_slice(&self.objects);
        out.extend_from_slice(&self.functions);
        out.extend_from_slice(&self.obj_index);
        out.extend_from_slice(&self.func_index);
        out.extend_from_slice(&self.variables);
        out.extend_from_slice(&self.types);
        out.extend_from_slice(&self.strings);
        out
    }
}

/// Foreign-endian twin of a native current-version image. The body swap is
/// the flip pass itself, which is its own inverse.
pub(super) fn byte_swapped(native: &[u8]) -> Vec<u8> {
    let mut out = native.to_vec();

    // Preamble: three u16 fields, reserved halfword left alone.
    for field in out[0..6].chunks_exact_mut(2) {
        field.reverse();
    }

    let header_end = PREAMBLE_SIZE + HEADER_SIZE;
    let header =
        typecask_format::preamble::Header::from_bytes(&native[PREAMBLE_SIZE..header_end]);
    for field in out[PREAMBLE_SIZE..header_end].chunks_exact_mut(4) {
        field.reverse();
    }

    flip_body(&mut out[header_end..], &header).expect("fixture body must flip cleanly");
    out
}

pub(super) struct SymtabBuilder {
    entsize: usize,
    data: Vec<u8>,
    strtab: Vec<u8>,
}

impl SymtabBuilder {
    pub fn elf32() -> Self {
        Self {
            entsize: 16,
            data: Vec::new(),
            strtab: vec![0],
        }
    }

    pub fn elf64() -> Self {
        Self {
            entsize: 24,
            data: Vec::new(),
            strtab: vec![0],
        }
    }

    pub fn add(&mut self, name: &str, stt: u8, shndx: u16, value: u64) {
        let name_ref = if name.is_empty() {
            0
        } else {
            let off = self.strtab.len() as u32;
            self.strtab.extend_from_slice(name.as_bytes());
            self.strtab.push(0);
            off
        };
        if self.entsize == 16 {
            push_u32(&mut self.data, name_ref);
            push_u32(&mut self.data, value as u32);
            push_u32(&mut self.data, 0);
            self.data.push(stt);
            self.data.push(0);
            push_u16(&mut self.data, shndx);
        } else {
            push_u32(&mut self.data, name_ref);
            self.data.push(stt);
            self.data.push(0);
            push_u16(&mut self.data, shndx);
            self.data.extend_from_slice(&value.to_ne_bytes());
            self.data.extend_from_slice(&0u64.to_ne_bytes());
        }
    }

    pub fn source(&self) -> SymtabSource<'_> {
        SymtabSource {
            data: &self.data,
            entsize: self.entsize,
            strtab: &self.strtab,
        }
    }
}
