use std::collections::HashSet;
use std::path::Path;

fn main() {
    let panel_path = Path::new("panels/ftdna_panels.json");
    validate_panel_file(panel_path);
    set_build_dependencies();
}

fn validate_panel_file(panel_path: &Path) {
    // Ensure the panel table exists at build time
    assert!(
        panel_path.exists(),
        "\n\nPANEL BUILD ERROR: File not found\n\
         Path: {}\n\
         Please create the panel table before building.\n",
        panel_path.display()
    );

    let contents = std::fs::read_to_string(panel_path).unwrap_or_else(|e| {
        panic!(
            "\n\nPANEL BUILD ERROR: Failed to read file\n\
             Path: {}\n\
             Error: {e}\n",
            panel_path.display()
        );
    });

    let table: serde_json::Value = serde_json::from_str(&contents).unwrap_or_else(|e| {
        panic!(
            "\n\nPANEL BUILD ERROR: Invalid JSON\n\
             Path: {}\n\
             Error: {e}\n\
             Hint: Check for missing commas, brackets, or invalid syntax.\n",
            panel_path.display()
        );
    });

    validate_panel_structure(&table);
}

fn validate_panel_structure(table: &serde_json::Value) {
    assert!(
        table.is_object(),
        "\n\nPANEL BUILD ERROR: Root must be a JSON object\n\
         Got: {table}\n"
    );

    let panels = table
        .get("panels")
        .and_then(serde_json::Value::as_array)
        .unwrap_or_else(|| {
            panic!(
                "\n\nPANEL BUILD ERROR: Missing or malformed 'panels' field\n\
                 The table must have a top-level 'panels' array.\n"
            );
        });

    assert!(
        !panels.is_empty(),
        "\n\nPANEL BUILD ERROR: 'panels' must contain at least one panel\n"
    );

    let all_markers = validate_panels(panels);
    validate_multi_copy(table, &all_markers);

    println!(
        "cargo:warning=Validated panel table: {} panels, {} markers",
        panels.len(),
        all_markers.len()
    );
}

/// Each panel lists only the markers it adds to the previous one, so strict
/// nesting holds as long as sizes grow and no marker appears twice.
fn validate_panels(panels: &[serde_json::Value]) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut previous_size = 0u64;

    for (i, panel) in panels.iter().enumerate() {
        let label = panel
            .get("label")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| {
                panic!("\n\nPANEL BUILD ERROR: Panel at index {i} missing 'label' field\n");
            });

        let size = panel
            .get("size")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or_else(|| {
                panic!("\n\nPANEL BUILD ERROR: Panel '{label}' missing numeric 'size' field\n");
            });

        assert!(
            size > previous_size,
            "\n\nPANEL BUILD ERROR: Panel '{label}' has size {size}, which does not exceed \
             the previous panel ({previous_size})\n\
             Panels must be listed smallest first.\n"
        );
        previous_size = size;

        let markers = panel
            .get("markers")
            .and_then(serde_json::Value::as_array)
            .unwrap_or_else(|| {
                panic!("\n\nPANEL BUILD ERROR: Panel '{label}' missing 'markers' array\n");
            });

        assert!(
            !markers.is_empty(),
            "\n\nPANEL BUILD ERROR: Panel '{label}' adds no markers\n"
        );

        for marker in markers {
            let name = marker.as_str().unwrap_or_else(|| {
                panic!("\n\nPANEL BUILD ERROR: Panel '{label}' has a non-string marker: {marker}\n");
            });
            assert!(
                seen.insert(name.to_string()),
                "\n\nPANEL BUILD ERROR: Marker '{name}' appears more than once (panel '{label}')\n\
                 Larger panels only list the markers they add.\n"
            );
        }
    }

    seen
}

fn validate_multi_copy(table: &serde_json::Value, all_markers: &HashSet<String>) {
    let Some(multi_copy) = table.get("multi_copy") else {
        return;
    };

    let entries = multi_copy.as_array().unwrap_or_else(|| {
        panic!("\n\nPANEL BUILD ERROR: 'multi_copy' must be an array of marker names\n");
    });

    for entry in entries {
        let name = entry.as_str().unwrap_or("<non-string>");
        assert!(
            all_markers.contains(name),
            "\n\nPANEL BUILD ERROR: Multi-copy marker '{name}' is not part of any panel\n"
        );
    }
}

fn set_build_dependencies() {
    // Tell cargo to rerun if the panel table changes
    println!("cargo:rerun-if-changed=panels/ftdna_panels.json");

    // Tell cargo to rerun if build.rs changes
    println!("cargo:rerun-if-changed=build.rs");
}
