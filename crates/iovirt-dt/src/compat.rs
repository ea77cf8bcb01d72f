//! Compatibility strings and property names matched by the decoder.

/// `compatible` entries identifying an SMMUv3.
pub const SMMU_V3: &[&str] = &["arm,smmu-v3"];

/// `compatible` entries identifying an SMMUv1/v2.
pub const SMMU_V2: &[&str] = &["arm,smmu-v1", "arm,smmu-v2", "arm,mmu-500"];

/// `device_type` of a PCI host bridge.
pub const PCI_DEVICE_TYPE: &str = "pci";

/// `status` value that excludes a node.
pub const STATUS_DISABLED: &str = "disabled";

pub const PROP_COMPATIBLE: &str = "compatible";
pub const PROP_STATUS: &str = "status";
pub const PROP_REG: &str = "reg";
pub const PROP_DEVICE_TYPE: &str = "device_type";
pub const PROP_IOMMU_MAP: &str = "iommu-map";
pub const PROP_DMA_COHERENT: &str = "dma-coherent";
pub const PROP_ATS_SUPPORTED: &str = "ats-supported";
pub const PROP_PHANDLE: &str = "phandle";
pub const PROP_LINUX_PHANDLE: &str = "linux,phandle";
pub const PROP_ADDRESS_CELLS: &str = "#address-cells";
pub const PROP_SIZE_CELLS: &str = "#size-cells";

/// Cell counts assumed when the parent does not declare them.
pub const DEFAULT_ADDRESS_CELLS: u32 = 2;
pub const DEFAULT_SIZE_CELLS: u32 = 1;

/// An upstream SMMU `reg` is always read as a 64-bit address.
pub const SMMU_REG_ADDRESS_CELLS: u32 = 2;
