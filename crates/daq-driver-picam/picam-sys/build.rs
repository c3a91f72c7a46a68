use std::env;
use std::path::PathBuf;

fn main() {
    // Bindgen and linking only run with the `picam-sdk` feature so the crate
    // builds on machines without the SDK.
    #[cfg(feature = "picam-sdk")]
    {
        println!("cargo:rerun-if-env-changed=PICAM_SDK_DIR");
        println!("cargo:rerun-if-env-changed=PICAM_LIB_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = env::var("PICAM_SDK_DIR").expect(
            "PICAM_SDK_DIR environment variable must be set when `picam-sdk` feature is enabled.",
        );

        let sdk_include_path = PathBuf::from(&sdk_dir).join("includes");

        // Allow PICAM_LIB_DIR to override the default lib path
        let sdk_lib_path = if let Ok(lib_dir) = env::var("PICAM_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else {
            PathBuf::from(&sdk_dir).join("lib")
        };

        if !sdk_include_path.exists() {
            panic!(
                "PICam SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: PICam SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            .allowlist_function("Picam_.*")
            .allowlist_type("Picam.*")
            .allowlist_type("pi.*")
            .allowlist_var("Picam.*")
            // Enumerators become integer constants keeping their C names.
            .default_enum_style(bindgen::EnumVariation::Consts)
            .prepend_enum_name(false)
            .derive_default(true)
            .generate()
            .expect("Unable to generate bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

        #[cfg(target_os = "windows")]
        {
            println!("cargo:rustc-link-lib=Picam");
        }
        #[cfg(not(target_os = "windows"))]
        {
            println!("cargo:rustc-link-lib=picam");
        }
    }
    #[cfg(not(feature = "picam-sdk"))]
    {
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// PICam bindings are only generated with the `picam-sdk` feature\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
