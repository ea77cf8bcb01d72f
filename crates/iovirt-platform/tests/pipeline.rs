//! Full builds from each source, published and queried from several threads.

use iovirt_core::{BlockKind, SmmuRevision};
use iovirt_iort::{IortWriter, RawIdMapping, RootComplexNode};
use iovirt_platform::{
    build_topology, BuildError, PlatformConfig, SourceInputs, SourcePreference, TopologyCell,
};
use iovirt_verify::{resolve_smmu_base, root_complex, smmu_count, smmu_info, SmmuRoute};
use vm_fdt::FdtWriter;

fn iort_image() -> Vec<u8> {
    let mut writer = IortWriter::new();
    let its = writer.its_group(&[0]);
    let smmu = writer.smmu_v3(0x2b40_0000, &[RawIdMapping::new(0, 0x1_0000, 0, its)]);
    writer.root_complex(
        RootComplexNode {
            segment: 0,
            coherent: true,
            ats_supported: true,
        },
        &[RawIdMapping::new(0, 0x1_0000, 0, smmu)],
    );
    writer.finish()
}

fn device_tree() -> Vec<u8> {
    let mut fdt = FdtWriter::new().unwrap();
    let root = fdt.begin_node("").unwrap();
    fdt.property_u32("#address-cells", 2).unwrap();
    fdt.property_u32("#size-cells", 2).unwrap();
    let smmu = fdt.begin_node("iommu@2b400000").unwrap();
    fdt.property_string("compatible", "arm,smmu-v3").unwrap();
    fdt.property_array_u32("reg", &[0x0, 0x2b40_0000, 0x0, 0x2_0000])
        .unwrap();
    fdt.property_u32("phandle", 1).unwrap();
    fdt.end_node(smmu).unwrap();
    let pci = fdt.begin_node("pcie@40000000").unwrap();
    fdt.property_string("device_type", "pci").unwrap();
    fdt.property_array_u32("iommu-map", &[0x0, 1, 0x0, 0x1_0000])
        .unwrap();
    fdt.property_null("dma-coherent").unwrap();
    fdt.end_node(pci).unwrap();
    fdt.end_node(root).unwrap();
    fdt.finish().unwrap()
}

#[test]
fn iort_build_published_to_readers() {
    let cell = TopologyCell::new();
    let table = cell
        .build_and_publish(&SourceInputs::iort(iort_image()), &PlatformConfig::default())
        .unwrap();
    assert_eq!(table.counts().blocks, 3);

    std::thread::scope(|scope| {
        for rid in [0x0u32, 0x100, 0xfff0] {
            let cell = &cell;
            scope.spawn(move || {
                let table = cell.get().unwrap();
                assert_eq!(
                    resolve_smmu_base(table, 0, rid).unwrap(),
                    SmmuRoute::BehindSmmu(0x2b40_0000)
                );
            });
        }
    });
    assert!(matches!(
        cell.build_and_publish(&SourceInputs::iort(iort_image()), &PlatformConfig::default()),
        Err(BuildError::AlreadyPublished)
    ));
}

#[test]
fn device_tree_build() {
    let table = build_topology(
        &SourceInputs::device_tree(device_tree()),
        &PlatformConfig::default(),
    )
    .unwrap();
    assert_eq!(smmu_count(&table), 1);
    assert_eq!(smmu_info(&table, 0).unwrap().arch_major_rev, 3);

    let rc = root_complex(&table, 0).unwrap();
    match table.get(rc).unwrap().kind() {
        BlockKind::PciRootComplex {
            coherent,
            ats_supported,
            upstream_smmu_base,
            ..
        } => {
            assert!(!coherent);
            assert!(ats_supported);
            assert_eq!(*upstream_smmu_base, 0x2b40_0000);
        }
        other => panic!("expected root complex, got {other:?}"),
    }
}

#[test]
fn configured_preference_picks_device_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iovirt.toml");
    std::fs::write(&path, "[source]\nprefer = \"device-tree\"\n").unwrap();
    let config = PlatformConfig::load(&path).unwrap();
    assert_eq!(config.source.prefer, SourcePreference::DeviceTree);

    let inputs = SourceInputs {
        iort: Some(iort_image()),
        dtb: Some(device_tree()),
    };
    let table = build_topology(&inputs, &config).unwrap();
    // The device tree has no ITS group; the IORT image does.
    assert_eq!(table.counts().its_groups, 0);
    assert_eq!(table.counts().root_complexes, 1);
}

#[test]
fn configured_override() {
    let config = PlatformConfig::from_toml_str(
        "[override]\nsmmu-base = 0x5000000\nsmmu-arch-major-rev = 2\n",
    )
    .unwrap();
    let table = build_topology(&SourceInputs::default(), &config).unwrap();
    assert_eq!(table.counts().blocks, 1);
    assert_eq!(
        smmu_info(&table, 0).unwrap().revision(),
        Some(SmmuRevision::V2)
    );
}
