//! Materialized view over a flattened device tree.
//!
//! The `fdt` crate parses the blob; this module flattens its node hierarchy
//! into a list that remembers each node's path and parent, and indexes
//! nodes by phandle.

use std::collections::HashMap;

use fdt::node::FdtNode;
use fdt::Fdt;
use log::debug;

use crate::compat;
use crate::error::DeviceTreeError;

/// `#address-cells` / `#size-cells` in effect for a node's `reg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSizes {
    pub address: u32,
    pub size: u32,
}

impl Default for CellSizes {
    fn default() -> Self {
        Self {
            address: compat::DEFAULT_ADDRESS_CELLS,
            size: compat::DEFAULT_SIZE_CELLS,
        }
    }
}

/// One device-tree node with its raw properties.
#[derive(Debug, Clone)]
pub struct DtNode<'a> {
    path: String,
    parent: Option<usize>,
    properties: Vec<(&'a str, &'a [u8])>,
}

impl<'a> DtNode<'a> {
    /// Full path, e.g. `/soc/iommu@2b400000`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw value of the named property.
    pub fn property(&self, name: &str) -> Option<&'a [u8]> {
        self.properties
            .iter()
            .find(|(prop, _)| *prop == name)
            .map(|(_, value)| *value)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// A string property, without its terminating NUL.
    pub fn string_property(&self, name: &str) -> Option<&'a str> {
        let value = self.property(name)?;
        let value = value.strip_suffix(&[0u8]).unwrap_or(value);
        std::str::from_utf8(value).ok()
    }

    /// Every entry of the `compatible` string list.
    pub fn compatible(&self) -> impl Iterator<Item = &'a str> {
        self.property(compat::PROP_COMPATIBLE)
            .unwrap_or_default()
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| std::str::from_utf8(entry).ok())
    }

    /// True if any `compatible` entry is in `list`.
    pub fn is_compatible(&self, list: &[&str]) -> bool {
        self.compatible().any(|entry| list.contains(&entry))
    }

    /// True if `status` is exactly `"disabled"`.
    pub fn is_disabled(&self) -> bool {
        self.string_property(compat::PROP_STATUS) == Some(compat::STATUS_DISABLED)
    }

    /// The node's phandle, from `phandle` or `linux,phandle`.
    pub fn phandle(&self) -> Option<u32> {
        self.property(compat::PROP_PHANDLE)
            .or_else(|| self.property(compat::PROP_LINUX_PHANDLE))
            .and_then(|value| be_cells(value).next())
    }
}

/// Big-endian 32-bit cells of a property value. A trailing partial cell is
/// ignored.
pub(crate) fn be_cells(value: &[u8]) -> impl Iterator<Item = u32> + '_ {
    value
        .chunks_exact(4)
        .map(|cell| u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
}

/// Every node of a device-tree blob, in depth-first order.
#[derive(Debug, Clone, Default)]
pub struct DeviceTree<'a> {
    nodes: Vec<DtNode<'a>>,
    phandles: HashMap<u32, usize>,
}

impl<'a> DeviceTree<'a> {
    /// Parse `blob` and flatten its node hierarchy.
    pub fn parse(blob: &'a [u8]) -> Result<Self, DeviceTreeError> {
        let fdt = Fdt::new(blob).map_err(|err| DeviceTreeError::InvalidBlob(format!("{err:?}")))?;
        let root = fdt
            .find_node("/")
            .ok_or_else(|| DeviceTreeError::InvalidBlob("missing root node".to_string()))?;

        let mut tree = DeviceTree::default();
        tree.walk(root, None, String::from("/"));
        debug!(
            "device tree: {} nodes, {} phandles",
            tree.nodes.len(),
            tree.phandles.len()
        );
        Ok(tree)
    }

    fn walk(&mut self, node: FdtNode<'_, 'a>, parent: Option<usize>, path: String) {
        let index = self.nodes.len();
        let dt_node = DtNode {
            path,
            parent,
            properties: node.properties().map(|prop| (prop.name, prop.value)).collect(),
        };
        if let Some(phandle) = dt_node.phandle() {
            self.phandles.entry(phandle).or_insert(index);
        }
        let base = if dt_node.path == "/" {
            String::new()
        } else {
            dt_node.path.clone()
        };
        self.nodes.push(dt_node);

        for child in node.children() {
            let child_path = format!("{base}/{}", child.name);
            self.walk(child, Some(index), child_path);
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DtNode<'a>> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node declaring `phandle`, if any.
    pub fn node_by_phandle(&self, phandle: u32) -> Option<&DtNode<'a>> {
        self.phandles.get(&phandle).map(|index| &self.nodes[*index])
    }

    pub fn parent(&self, node: &DtNode<'a>) -> Option<&DtNode<'a>> {
        node.parent.map(|index| &self.nodes[index])
    }

    /// Cell sizes governing `node`'s `reg`, declared by its parent.
    ///
    /// Absent properties take the defaults. A declared value must be a single
    /// cell, with an address size of 1 or 2 cells and a size of at least 1.
    pub fn cell_sizes(&self, node: &DtNode<'a>) -> Result<CellSizes, DeviceTreeError> {
        self.read_cell_sizes(node, |size| size >= 1)
    }

    /// Cell sizes above a PCI host bridge. `#size-cells` may be zero here;
    /// only a value that is negative as a signed cell is rejected.
    pub fn host_bridge_cell_sizes(&self, node: &DtNode<'a>) -> Result<CellSizes, DeviceTreeError> {
        self.read_cell_sizes(node, |size| i32::try_from(size).is_ok())
    }

    fn read_cell_sizes(
        &self,
        node: &DtNode<'a>,
        size_ok: impl Fn(u32) -> bool,
    ) -> Result<CellSizes, DeviceTreeError> {
        let Some(parent) = self.parent(node) else {
            return Ok(CellSizes::default());
        };
        let address = cell_count(parent, compat::PROP_ADDRESS_CELLS)?
            .unwrap_or(compat::DEFAULT_ADDRESS_CELLS);
        let size =
            cell_count(parent, compat::PROP_SIZE_CELLS)?.unwrap_or(compat::DEFAULT_SIZE_CELLS);

        let invalid = |property: &'static str| DeviceTreeError::InvalidCells {
            path: parent.path.clone(),
            property,
            value: parent.property(property).unwrap_or_default().to_vec(),
        };
        if !(1..=2).contains(&address) {
            return Err(invalid(compat::PROP_ADDRESS_CELLS));
        }
        if !size_ok(size) {
            return Err(invalid(compat::PROP_SIZE_CELLS));
        }
        Ok(CellSizes { address, size })
    }
}

fn cell_count(node: &DtNode<'_>, property: &'static str) -> Result<Option<u32>, DeviceTreeError> {
    match node.property(property) {
        None => Ok(None),
        Some(value) if value.len() == 4 => Ok(be_cells(value).next()),
        Some(value) => Err(DeviceTreeError::InvalidCells {
            path: node.path.clone(),
            property,
            value: value.to_vec(),
        }),
    }
}
