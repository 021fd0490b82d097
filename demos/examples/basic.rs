use cellforge_core::{solve, Cell, SolveOptions};
use cellforge_gds::{export_gds, GdsUnits, LayerMap};

/// Builds a two-finger standard cell: a container holding two `metal1`
/// leaves side by side with a fixed gap, solves it, then freezes it
/// and nests a copy of the frozen cell inside a larger block.
fn main() {
    tracing_subscriber::fmt::init();

    let row = Cell::container("row");
    let finger_a = Cell::leaf("finger_a", "metal1");
    let finger_b = Cell::leaf("finger_b", "metal1");

    row.constrain_abs(&finger_a, "swidth = 40, sheight = 120").unwrap();
    row.constrain_abs(&finger_b, "swidth = 40, sheight = 120").unwrap();
    row.constrain_rel(&finger_a, "rl_edge = -10", &finger_b).unwrap();
    row.constrain_self("x1 = 0, y1 = 0").unwrap();

    solve(&row, SolveOptions::default()).expect("row solves");
    println!(
        "row bbox: ({}, {}) - ({}, {})",
        row.x1().unwrap(),
        row.y1().unwrap(),
        row.x2().unwrap(),
        row.y2().unwrap()
    );

    row.freeze_layout().unwrap();

    let block = Cell::container("block");
    let spacer = Cell::leaf("spacer", "metal2");
    block.add_child(row.copy(Some("row_instance"))).unwrap();
    block.constrain_abs(&spacer, "swidth = 20, sheight = 120").unwrap();
    block
        .constrain_self("x1 = 0, y1 = 0, x2 - x1 >= 300, y2 - y1 >= 120")
        .unwrap();

    solve(&block, SolveOptions::default()).expect("block solves");
    println!(
        "block bbox: ({}, {}) - ({}, {})",
        block.x1().unwrap(),
        block.y1().unwrap(),
        block.x2().unwrap(),
        block.y2().unwrap()
    );
    for child in block.children() {
        println!("  {} -> {:?}", child.name(), child.bbox());
    }

    let layer_map = LayerMap::new([
        ("metal1".to_string(), (10, 0)),
        ("metal2".to_string(), (11, 0)),
    ]);
    let out = std::env::temp_dir().join("cellforge_demo_block.gds");
    export_gds(&block, &out, &layer_map, true, GdsUnits::default()).expect("block exports to GDSII");
    println!("wrote {}", out.display());
}
