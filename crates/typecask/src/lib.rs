//! Reader for typecask type-metadata containers.
//!
//! A container is a compact binary blob of type, symbol and variable
//! metadata emitted by a compiler and consumed by linkers and debuggers.
//! This crate implements the read path only: [`Container::open`] validates a
//! raw buffer, normalizes historical on-disk versions and foreign byte
//! orders into the current in-memory form, indexes the type section, and
//! optionally correlates an ELF-style symbol table. The resulting handle is
//! immutable and safe to query from multiple threads.
//!
//! Locating container bytes inside object files or archives, write-back, and
//! compression internals are out of scope; decompression is supplied by the
//! caller through the [`Decompress`] trait.

pub mod container;

pub use container::{
    Container, DataModel, Decompress, DecompressError, FormatVersion, LabelEntry, Namespace,
    OpenError, OpenOptions, QueryError, SymtabSource, TypeId, TypeView, VarEntry, dump,
};
