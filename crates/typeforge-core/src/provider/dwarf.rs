//! # DWARF Symbol Provider
//!
//! Production [`SymbolProvider`] reading type information straight from the
//! DWARF sections of binaries on disk.
//!
//! Each binary is one module, named after its file stem. Sections are read
//! eagerly when the provider is opened; the DWARF itself is parsed and
//! indexed lazily on the first query against a module.
//!
//! ## Tag mapping
//!
//! | DWARF tag | Shape |
//! |-----------|-------|
//! | `base_type` | `Primitive`, by `DW_ATE_*` encoding and size |
//! | `pointer_type`, `reference_type`, `rvalue_reference_type` | `Pointer` |
//! | `array_type` + `subrange_type` | `Array` |
//! | `enumeration_type` | `Enum` |
//! | `subroutine_type` | `Function` |
//! | `structure_type`, `class_type`, `union_type` | `Aggregate` |
//! | `typedef` and cv-qualifiers | `Alias` |
//!
//! Anything else is reported as `Unsupported` and ends up `Undefined`.
//!
//! ## Offsets
//!
//! [`TypeQuery::Offset`] is a `.debug_info` section offset. Types living in
//! `.debug_types` units are only reachable by name (or by signature from a
//! reference).

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebugInfoOffset, DebugTypeSignature, DebuggingInformationEntry, Dwarf, EndianArcSlice,
    Reader, RunTimeEndian, SectionId, Unit, UnitOffset, UnitSectionOffset, UnitType,
};
use object::{Object, ObjectSection};
use once_cell::sync::OnceCell;
use rustc_demangle::try_demangle;
use tracing::{debug, info, warn};

use super::{AggregateShape, FieldShape, ShapeDescriptor, ShapeKind, SymbolProvider};
use crate::error::ProviderError;
use crate::model::{AggregateKind, PrimitiveKind, TypeQuery};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;
type Entry<'u> = DebuggingInformationEntry<'u, 'u, OwnedReader>;
type Result<T> = std::result::Result<T, ProviderError>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> ProviderError
{
    ProviderError::Malformed(format!("{context}: {err}"))
}

/// [`SymbolProvider`] over the DWARF of one or more binaries.
pub struct DwarfProvider
{
    modules: BTreeMap<String, DwarfModule>,
}

impl std::fmt::Debug for DwarfProvider
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DwarfProvider")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DwarfProvider
{
    /// Open binaries; each becomes a module named after its file stem.
    ///
    /// A stem that is already taken gets a numeric suffix (`libfoo_2`).
    ///
    /// ## Errors
    ///
    /// `Native` if a file cannot be read, `Malformed` if it is not an object
    /// file or a debug section cannot be decompressed.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self>
    {
        let mut modules = BTreeMap::new();
        for path in paths {
            let module = DwarfModule::parse(path.as_ref())?;
            let stem = path
                .as_ref()
                .file_stem()
                .map_or_else(|| "module".to_string(), |stem| stem.to_string_lossy().into_owned());
            let mut name = stem.clone();
            let mut counter = 2;
            while modules.contains_key(&name) {
                name = format!("{stem}_{counter}");
                counter += 1;
            }
            info!(module = %name, path = %path.as_ref().display(), "Opened binary");
            modules.insert(name, module);
        }
        Ok(Self { modules })
    }

    /// Path of the binary behind a module.
    #[must_use]
    pub fn path(&self, module: &str) -> Option<&Path>
    {
        self.modules.get(module).map(|module| module.path.as_path())
    }
}

impl SymbolProvider for DwarfProvider
{
    fn modules(&mut self) -> Result<Vec<String>>
    {
        Ok(self.modules.keys().cloned().collect())
    }

    fn type_names(&mut self, module: &str) -> Result<Vec<String>>
    {
        let loaded = self
            .modules
            .get(module)
            .ok_or_else(|| ProviderError::UnknownModule(module.to_string()))?
            .loaded()?;
        Ok(loaded
            .names
            .iter()
            .filter(|(_, indexed)| indexed.listed)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn lookup_type(&mut self, module: &str, query: &TypeQuery) -> Result<Option<ShapeDescriptor>>
    {
        if let TypeQuery::Primitive(kind) = query {
            return Ok(Some(ShapeDescriptor::new(kind.size().unwrap_or(0), ShapeKind::Primitive(*kind))));
        }
        let Some(module) = self.modules.get(module) else {
            return Ok(None);
        };
        let pointer_size = module.pointer_size;
        let loaded = module.loaded()?;
        let location = match query {
            TypeQuery::Name(name) => loaded.find_by_name(name),
            TypeQuery::Offset(offset) => loaded.find_by_offset(*offset),
            TypeQuery::Primitive(_) => None,
        };
        match location {
            Some(location) => loaded.describe(location, pointer_size).map(Some),
            None => Ok(None),
        }
    }
}

/// One binary's sections, with DWARF parsed on demand.
struct DwarfModule
{
    path: PathBuf,
    endian: RunTimeEndian,
    pointer_size: u64,
    sections: HashMap<&'static str, Arc<[u8]>>,
    loaded: OnceCell<LoadedDwarf>,
}

impl DwarfModule
{
    fn parse(path: &Path) -> Result<Self>
    {
        let bytes =
            fs::read(path).map_err(|err| ProviderError::Native(format!("failed to read {}: {err}", path.display())))?;
        let file = object::File::parse(&*bytes)
            .map_err(|err| ProviderError::Malformed(format!("failed to parse {}: {err}", path.display())))?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let pointer_size = if file.is_64() { 8 } else { 4 };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            sections.insert(*canonical, load_section_bytes(&file, aliases)?);
        }

        Ok(Self {
            path: path.to_path_buf(),
            endian,
            pointer_size,
            sections,
            loaded: OnceCell::new(),
        })
    }

    fn loaded(&self) -> Result<&LoadedDwarf>
    {
        self.loaded.get_or_try_init(|| {
            let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
                .map_err(|err| map_dwarf_error("loading DWARF", err))?;
            let loaded = LoadedDwarf::index(dwarf, self.endian)?;
            debug!(
                path = %self.path.display(),
                units = loaded.units.len(),
                types = loaded.names.len(),
                "Indexed DWARF types"
            );
            Ok(loaded)
        })
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Arc<[u8]>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| ProviderError::Malformed(format!("failed to read {name}: {err}")))?;
            return Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            });
        }
    }
    Ok(Arc::<[u8]>::from(Vec::new()))
}

/// A DIE: unit index plus offset within that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Location
{
    unit: usize,
    offset: UnitOffset<usize>,
}

#[derive(Debug, Clone, Copy)]
struct IndexedType
{
    location: Location,
    declaration: bool,
    /// Shown by `type_names` (aggregates, enums and typedefs)
    listed: bool,
}

/// Parsed DWARF plus name and signature indexes.
struct LoadedDwarf
{
    dwarf: OwnedDwarf,
    endian: RunTimeEndian,
    units: Vec<Unit<OwnedReader>>,
    names: BTreeMap<String, IndexedType>,
    qualified: HashMap<Location, String>,
    signatures: HashMap<DebugTypeSignature, Location>,
}

impl LoadedDwarf
{
    fn index(dwarf: OwnedDwarf, endian: RunTimeEndian) -> Result<Self>
    {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing compilation unit", err))?);
        }
        let mut type_headers = dwarf.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
        }

        let mut loaded = Self {
            dwarf,
            endian,
            units,
            names: BTreeMap::new(),
            qualified: HashMap::new(),
            signatures: HashMap::new(),
        };
        let (names, qualified, signatures) = loaded.build_indexes()?;
        loaded.names = names;
        loaded.qualified = qualified;
        loaded.signatures = signatures;
        Ok(loaded)
    }

    #[allow(clippy::type_complexity)]
    fn build_indexes(
        &self,
    ) -> Result<(
        BTreeMap<String, IndexedType>,
        HashMap<Location, String>,
        HashMap<DebugTypeSignature, Location>,
    )>
    {
        let mut names: BTreeMap<String, IndexedType> = BTreeMap::new();
        let mut qualified = HashMap::new();
        let mut signatures = HashMap::new();

        for (index, unit) in self.units.iter().enumerate() {
            if let UnitType::Type {
                type_signature,
                type_offset,
            }
            | UnitType::SplitType {
                type_signature,
                type_offset,
            } = unit.header.type_()
            {
                signatures.insert(
                    type_signature,
                    Location {
                        unit: index,
                        offset: type_offset,
                    },
                );
            }

            // Name of every enclosing scope, by depth; `None` for scopes that do not qualify names.
            let mut scopes: Vec<Option<String>> = Vec::new();
            let mut depth: isize = 0;
            let mut cursor = unit.entries();
            while let Some((delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
                depth += delta;
                scopes.truncate(usize::try_from(depth).unwrap_or(0));

                let tag = entry.tag();
                let name = self.entry_name(unit, entry)?;
                let scope_name = match tag {
                    constants::DW_TAG_namespace => Some(name.clone().unwrap_or_else(|| "(anonymous namespace)".to_string())),
                    constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                        name.clone()
                    }
                    _ => None,
                };

                let listed = matches!(
                    tag,
                    constants::DW_TAG_structure_type
                        | constants::DW_TAG_class_type
                        | constants::DW_TAG_union_type
                        | constants::DW_TAG_enumeration_type
                        | constants::DW_TAG_typedef
                );
                if let (Some(name), true) = (&name, listed || tag == constants::DW_TAG_base_type) {
                    let mut full = scopes.iter().flatten().cloned().collect::<Vec<_>>().join("::");
                    if !full.is_empty() {
                        full.push_str("::");
                    }
                    full.push_str(name);

                    let location = Location {
                        unit: index,
                        offset: entry.offset(),
                    };
                    let declaration = Self::flag(entry, constants::DW_AT_declaration)?;
                    qualified.insert(location, full.clone());
                    let candidate = IndexedType {
                        location,
                        declaration,
                        listed,
                    };
                    // Definitions win over declarations; otherwise first seen wins.
                    let replace = names
                        .get(&full)
                        .is_none_or(|existing| existing.declaration && !declaration);
                    if replace {
                        names.insert(full, candidate);
                    }
                }

                scopes.push(scope_name);
            }
        }
        Ok((names, qualified, signatures))
    }

    fn find_by_name(&self, name: &str) -> Option<Location>
    {
        let name = name.strip_prefix("::").unwrap_or(name);
        self.names.get(name).map(|indexed| indexed.location)
    }

    fn find_by_offset(&self, offset: u64) -> Option<Location>
    {
        let offset = usize::try_from(offset).ok()?;
        let target = UnitSectionOffset::from(DebugInfoOffset(offset));
        self.units.iter().enumerate().find_map(|(index, unit)| {
            target.to_unit_offset(unit).map(|offset| Location { unit: index, offset })
        })
    }

    fn unit(&self, location: Location) -> &Unit<OwnedReader>
    {
        &self.units[location.unit]
    }

    fn describe(&self, location: Location, pointer_size: u64) -> Result<ShapeDescriptor>
    {
        let unit = self.unit(location);
        let entry = unit
            .entry(location.offset)
            .map_err(|err| map_dwarf_error("resolving type reference", err))?;
        let size = Self::udata(&entry, constants::DW_AT_byte_size)?;

        let shape = match entry.tag() {
            constants::DW_TAG_base_type => {
                let name = self.entry_name(unit, &entry)?.unwrap_or_default();
                let encoding = match entry
                    .attr(constants::DW_AT_encoding)
                    .map_err(|err| map_dwarf_error("reading DW_AT_encoding", err))?
                    .map(|attr| attr.value())
                {
                    Some(AttributeValue::Encoding(encoding)) => Some(encoding),
                    _ => None,
                };
                match encoding.and_then(|encoding| primitive_from_encoding(encoding, size.unwrap_or(0), &name)) {
                    Some(kind) => ShapeKind::Primitive(kind),
                    None => ShapeKind::Unsupported(format!("base type {name}")),
                }
            }
            constants::DW_TAG_pointer_type | constants::DW_TAG_reference_type | constants::DW_TAG_rvalue_reference_type => {
                ShapeKind::Pointer {
                    pointee: self.type_reference(location, &entry)?,
                }
            }
            constants::DW_TAG_typedef
            | constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type => ShapeKind::Alias {
                target: self.type_reference(location, &entry)?,
            },
            constants::DW_TAG_array_type => self.array_shape(location, &entry)?,
            constants::DW_TAG_enumeration_type => self.enum_shape(location, &entry, size.unwrap_or(0))?,
            constants::DW_TAG_subroutine_type => self.function_shape(location, &entry)?,
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                ShapeKind::Aggregate(self.aggregate_shape(location, &entry)?)
            }
            other => ShapeKind::Unsupported(other.static_string().unwrap_or("unknown tag").to_string()),
        };

        let size = match shape {
            ShapeKind::Pointer { .. } => size.unwrap_or(pointer_size),
            _ => size.unwrap_or(0),
        };
        Ok(ShapeDescriptor::new(size, shape))
    }

    fn array_shape(&self, location: Location, entry: &Entry<'_>) -> Result<ShapeKind>
    {
        let element = self.type_reference(location, entry)?;
        let mut dimensions = Vec::new();
        for child in self.children(location)? {
            if child.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            let length = match Self::udata(&child, constants::DW_AT_count)? {
                Some(count) => Some(count),
                None => {
                    let lower = Self::udata(&child, constants::DW_AT_lower_bound)?.unwrap_or(0);
                    Self::udata(&child, constants::DW_AT_upper_bound)?
                        .map(|upper| (upper + 1).saturating_sub(lower))
                }
            };
            dimensions.push(length);
        }
        if dimensions.is_empty() {
            dimensions.push(None);
        }
        Ok(ShapeKind::Array { element, dimensions })
    }

    fn enum_shape(&self, location: Location, entry: &Entry<'_>, size: u64) -> Result<ShapeKind>
    {
        let underlying = if entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
            .is_some()
        {
            self.type_reference(location, entry)?
        } else {
            TypeQuery::Primitive(PrimitiveKind::signed(size).unwrap_or(PrimitiveKind::I32))
        };
        let unsigned_storage = self.is_unsigned_base(location, entry)?;

        let mut members = Vec::new();
        for child in self.children(location)? {
            if child.tag() != constants::DW_TAG_enumerator {
                continue;
            }
            let name = self.entry_name(self.unit(location), &child)?.unwrap_or_default();
            let value = child
                .attr(constants::DW_AT_const_value)
                .map_err(|err| map_dwarf_error("reading DW_AT_const_value", err))?
                .and_then(|attr| {
                    let signed = attr.sdata_value().map(i128::from);
                    let unsigned = attr.udata_value().map(i128::from);
                    if unsigned_storage {
                        unsigned.or(signed)
                    } else {
                        signed.or(unsigned)
                    }
                })
                .unwrap_or(0);
            members.push((name, value));
        }

        Ok(ShapeKind::Enum {
            name: self.qualified_name(location, entry)?,
            underlying,
            members,
        })
    }

    /// Whether an enum's `DW_AT_type` points straight at an unsigned base type.
    fn is_unsigned_base(&self, location: Location, entry: &Entry<'_>) -> Result<bool>
    {
        let Some(AttributeValue::UnitRef(offset)) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
            .map(|attr| attr.value())
        else {
            return Ok(false);
        };
        let target = self
            .unit(location)
            .entry(offset)
            .map_err(|err| map_dwarf_error("resolving enum storage", err))?;
        let encoding = target
            .attr(constants::DW_AT_encoding)
            .map_err(|err| map_dwarf_error("reading DW_AT_encoding", err))?
            .map(|attr| attr.value());
        Ok(matches!(
            encoding,
            Some(AttributeValue::Encoding(constants::DW_ATE_unsigned | constants::DW_ATE_unsigned_char | constants::DW_ATE_boolean))
        ))
    }

    fn function_shape(&self, location: Location, entry: &Entry<'_>) -> Result<ShapeKind>
    {
        let return_type = self.type_reference(location, entry)?;
        let mut parameters = Vec::new();
        for child in self.children(location)? {
            if child.tag() == constants::DW_TAG_formal_parameter {
                let child_location = Location {
                    unit: location.unit,
                    offset: child.offset(),
                };
                parameters.push(self.type_reference(child_location, &child)?);
            }
        }
        Ok(ShapeKind::Function {
            return_type,
            parameters,
        })
    }

    fn aggregate_shape(&self, location: Location, entry: &Entry<'_>) -> Result<AggregateShape>
    {
        let mut shape = AggregateShape::new(self.qualified_name(location, entry)?);
        shape.kind = match entry.tag() {
            constants::DW_TAG_class_type => AggregateKind::Class,
            constants::DW_TAG_union_type => AggregateKind::Union,
            _ => AggregateKind::Struct,
        };
        shape.declaration = Self::flag(entry, constants::DW_AT_declaration)?;
        if shape.declaration {
            return Ok(shape);
        }

        let unit = self.unit(location);
        for child in self.children(location)? {
            let child_location = Location {
                unit: location.unit,
                offset: child.offset(),
            };
            match child.tag() {
                constants::DW_TAG_member => {
                    // Static data members are declarations without storage in the object.
                    if Self::flag(&child, constants::DW_AT_declaration)? || Self::flag(&child, constants::DW_AT_external)? {
                        continue;
                    }
                    let name = self.entry_name(unit, &child)?.unwrap_or_default();
                    let ty = self.type_reference(child_location, &child)?;
                    let Some((byte_offset, bit_field)) = self.member_position(child_location, &child)? else {
                        warn!(owner = %shape.name, member = %name, "Skipping member with a computed location");
                        continue;
                    };
                    let mut field = FieldShape::new(name, ty, byte_offset);
                    field.bit_field = bit_field;
                    shape.fields.push(field);
                }
                constants::DW_TAG_inheritance => shape.bases.push(self.type_reference(child_location, &child)?),
                constants::DW_TAG_template_type_parameter => {
                    shape.template_arguments.push(self.type_reference(child_location, &child)?);
                }
                _ => {}
            }
        }
        Ok(shape)
    }

    /// Byte offset and optional `(bit_offset, bit_width)` of a data member.
    ///
    /// `None` when the member's location is an expression that needs an object
    /// address to evaluate.
    fn member_position(&self, location: Location, entry: &Entry<'_>) -> Result<Option<(u64, Option<(u64, u64)>)>>
    {
        let bit_size = Self::udata(entry, constants::DW_AT_bit_size)?;
        if let Some(bits) = Self::udata(entry, constants::DW_AT_data_bit_offset)? {
            return Ok(Some((bits / 8, bit_size.map(|width| (bits % 8, width)))));
        }

        let Some(byte_offset) = Self::member_location(entry)? else {
            return Ok(None);
        };
        let Some(width) = bit_size else {
            return Ok(Some((byte_offset, None)));
        };
        let Some(bit_offset) = Self::udata(entry, constants::DW_AT_bit_offset)? else {
            return Ok(Some((byte_offset, Some((0, width)))));
        };
        let storage = match Self::udata(entry, constants::DW_AT_byte_size)? {
            Some(storage) => storage,
            None => self.referenced_size(location, entry)?.unwrap_or(4),
        };
        let little_endian = matches!(self.endian, RunTimeEndian::Little);
        let absolute = dwarf2_bit_position(little_endian, byte_offset, storage, bit_offset, width);
        Ok(Some((absolute / 8, Some((absolute % 8, width)))))
    }

    /// `DW_AT_data_member_location` as a byte offset. Union members may omit
    /// it, which means 0.
    fn member_location(entry: &Entry<'_>) -> Result<Option<u64>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
        else {
            return Ok(Some(0));
        };
        if let Some(offset) = attr.udata_value() {
            return Ok(Some(offset));
        }
        Ok(match attr.value() {
            AttributeValue::Exprloc(expression) => plus_uconst_offset(expression.0),
            AttributeValue::Block(block) => plus_uconst_offset(block),
            _ => None,
        })
    }

    fn referenced_size(&self, location: Location, entry: &Entry<'_>) -> Result<Option<u64>>
    {
        match entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
            .map(|attr| attr.value())
        {
            Some(AttributeValue::UnitRef(offset)) => {
                let target = self
                    .unit(location)
                    .entry(offset)
                    .map_err(|err| map_dwarf_error("resolving member type", err))?;
                Self::udata(&target, constants::DW_AT_byte_size)
            }
            _ => Ok(None),
        }
    }

    /// The `DW_AT_type` of an entry as a query; absent means `void`.
    fn type_reference(&self, location: Location, entry: &Entry<'_>) -> Result<TypeQuery>
    {
        let value = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
            .map(|attr| attr.value());
        Ok(match value {
            None => TypeQuery::Primitive(PrimitiveKind::Void),
            Some(AttributeValue::UnitRef(offset)) => self.query_for(Location {
                unit: location.unit,
                offset,
            }),
            Some(AttributeValue::DebugInfoRef(offset)) => TypeQuery::Offset(offset.0 as u64),
            Some(AttributeValue::DebugTypesRef(signature)) => match self.signatures.get(&signature) {
                Some(target) => self.query_for(*target),
                None => TypeQuery::Name(format!("<type signature {:#x}>", signature.0)),
            },
            Some(other) => TypeQuery::Name(format!("<unsupported type reference {other:?}>")),
        })
    }

    /// Offset query for `.debug_info` entries, name query for type units.
    fn query_for(&self, location: Location) -> TypeQuery
    {
        let unit = self.unit(location);
        if let Some(offset) = location.offset.to_debug_info_offset(&unit.header) {
            return TypeQuery::Offset(offset.0 as u64);
        }
        match self.qualified.get(&location) {
            Some(name) => TypeQuery::Name(name.clone()),
            None => TypeQuery::Name(format!("<type unit entry {:#x}>", location.offset.0)),
        }
    }

    fn qualified_name(&self, location: Location, entry: &Entry<'_>) -> Result<String>
    {
        if let Some(name) = self.qualified.get(&location) {
            return Ok(name.clone());
        }
        let kind = match entry.tag() {
            constants::DW_TAG_union_type => "union",
            constants::DW_TAG_enumeration_type => "enum",
            constants::DW_TAG_class_type => "class",
            _ => "struct",
        };
        Ok(match self.entry_name(self.unit(location), entry)? {
            Some(name) => name,
            None => format!("(anonymous {kind} at {:#x})", self.query_offset(location)),
        })
    }

    fn query_offset(&self, location: Location) -> usize
    {
        location
            .offset
            .to_debug_info_offset(&self.unit(location).header)
            .map_or(location.offset.0, |offset| offset.0)
    }

    fn children(&self, location: Location) -> Result<Vec<Entry<'_>>>
    {
        let unit = self.unit(location);
        let mut tree = unit
            .entries_tree(Some(location.offset))
            .map_err(|err| map_dwarf_error("building entry tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating entry root", err))?;
        let mut children = root.children();
        let mut entries = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating entry children", err))?
        {
            entries.push(child.entry().clone());
        }
        Ok(entries)
    }

    fn entry_name(&self, unit: &Unit<OwnedReader>, entry: &Entry<'_>) -> Result<Option<String>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_to_string(unit, attr.value())?));
        }
        if let Some(attr) = entry
            .attr(constants::DW_AT_linkage_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_linkage_name", err))?
        {
            let raw = self.attr_to_string(unit, attr.value())?;
            return Ok(Some(demangle_type_name(&raw)));
        }
        Ok(None)
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    fn udata(entry: &Entry<'_>, name: constants::DwAt) -> Result<Option<u64>>
    {
        Ok(entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading attribute", err))?
            .and_then(|attr| attr.udata_value()))
    }

    fn flag(entry: &Entry<'_>, name: constants::DwAt) -> Result<bool>
    {
        Ok(matches!(
            entry
                .attr(name)
                .map_err(|err| map_dwarf_error("reading flag", err))?
                .map(|attr| attr.value()),
            Some(AttributeValue::Flag(true))
        ))
    }
}

/// Demangle a linkage name, keeping it as is when it is not mangled.
fn demangle_type_name(raw: &str) -> String
{
    match try_demangle(raw) {
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => raw.to_string(),
    }
}

/// Primitive for a `DW_TAG_base_type`.
fn primitive_from_encoding(encoding: constants::DwAte, size: u64, name: &str) -> Option<PrimitiveKind>
{
    match encoding {
        constants::DW_ATE_boolean => Some(PrimitiveKind::Bool),
        constants::DW_ATE_float => match size {
            4 => Some(PrimitiveKind::F32),
            8 => Some(PrimitiveKind::F64),
            _ => None,
        },
        constants::DW_ATE_signed_char | constants::DW_ATE_unsigned_char if name == "char" => Some(PrimitiveKind::Char),
        constants::DW_ATE_UTF => match size {
            1 => Some(PrimitiveKind::Char),
            2 => Some(PrimitiveKind::Char16),
            4 => Some(PrimitiveKind::Char32),
            _ => None,
        },
        _ if name == "wchar_t" => Some(PrimitiveKind::WChar),
        constants::DW_ATE_signed | constants::DW_ATE_signed_char => PrimitiveKind::signed(size),
        constants::DW_ATE_unsigned | constants::DW_ATE_unsigned_char => PrimitiveKind::unsigned(size),
        _ => None,
    }
}

/// Convert a DWARF 2/3 bit-field position to a bit offset from the start
/// of the aggregate.
///
/// `DW_AT_bit_offset` counts from the most significant bit of a storage unit
/// of `storage_bytes` starting at `byte_offset`. On little-endian targets
/// the most significant bit is the last one in memory.
fn dwarf2_bit_position(little_endian: bool, byte_offset: u64, storage_bytes: u64, bit_offset: u64, bit_size: u64) -> u64
{
    let base = byte_offset * 8;
    if little_endian {
        (base + storage_bytes * 8).saturating_sub(bit_offset + bit_size)
    } else {
        base + bit_offset
    }
}

/// Offset encoded as a lone `DW_OP_plus_uconst n`, the member location form
/// DWARF 2 producers emit. Any other expression yields `None`.
fn plus_uconst_offset<R: Reader>(mut expression: R) -> Option<u64>
{
    if expression.read_u8().ok()? != constants::DW_OP_plus_uconst.0 {
        return None;
    }
    let offset = expression.read_uleb128().ok()?;
    expression.is_empty().then_some(offset)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_plus_uconst_member_location()
    {
        let read = |bytes: &'static [u8]| plus_uconst_offset(gimli::EndianSlice::new(bytes, gimli::LittleEndian));
        assert_eq!(read(&[0x23, 0x08]), Some(8));
        // ULEB128 spanning two bytes
        assert_eq!(read(&[0x23, 0x90, 0x01]), Some(144));
    }

    #[test]
    fn test_other_member_locations_are_rejected()
    {
        let read = |bytes: &'static [u8]| plus_uconst_offset(gimli::EndianSlice::new(bytes, gimli::LittleEndian));
        // DW_OP_constu 8
        assert_eq!(read(&[0x10, 0x08]), None);
        // plus_uconst followed by DW_OP_deref
        assert_eq!(read(&[0x23, 0x08, 0x06]), None);
        // truncated operand
        assert_eq!(read(&[0x23]), None);
        assert_eq!(read(&[]), None);
    }

    #[test]
    fn test_primitive_from_encoding()
    {
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_signed, 4, "int"),
            Some(PrimitiveKind::I32)
        );
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_unsigned, 8, "unsigned long"),
            Some(PrimitiveKind::U64)
        );
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_signed_char, 1, "char"),
            Some(PrimitiveKind::Char)
        );
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_signed_char, 1, "signed char"),
            Some(PrimitiveKind::I8)
        );
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_UTF, 4, "char"),
            Some(PrimitiveKind::Char32)
        );
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_signed, 4, "wchar_t"),
            Some(PrimitiveKind::WChar)
        );
        assert_eq!(primitive_from_encoding(constants::DW_ATE_float, 16, "long double"), None);
        assert_eq!(
            primitive_from_encoding(constants::DW_ATE_boolean, 1, "bool"),
            Some(PrimitiveKind::Bool)
        );
    }

    #[test]
    fn test_dwarf2_bit_position()
    {
        // struct { unsigned a : 3; unsigned b : 5; } on x86: b has bit_offset 24 in a 4-byte unit.
        assert_eq!(dwarf2_bit_position(true, 0, 4, 29, 3), 0);
        assert_eq!(dwarf2_bit_position(true, 0, 4, 24, 5), 3);
        assert_eq!(dwarf2_bit_position(false, 0, 4, 3, 5), 3);
        assert_eq!(dwarf2_bit_position(true, 4, 4, 31, 1), 32);
    }

    #[test]
    fn test_demangle_type_name()
    {
        assert_eq!(demangle_type_name("plain::Name"), "plain::Name");
        assert_eq!(
            demangle_type_name("_ZN3foo3bar17h05af221e174051e9E"),
            "foo::bar"
        );
    }

    #[test]
    fn test_open_missing_file()
    {
        let result = DwarfProvider::open(&["/nonexistent/typeforge-test-binary"]);
        assert!(matches!(result, Err(ProviderError::Native(_))));
    }

    #[test]
    fn test_open_rejects_non_object()
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not an object file").unwrap();
        let result = DwarfProvider::open(&[file.path()]);
        assert!(matches!(result, Err(ProviderError::Malformed(_))));
    }
}
