use std::{
    collections::{BTreeMap, HashMap},
    env, fs, io,
    path::{Path, PathBuf},
};

use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorSet,
};
use walkdir::WalkDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Every bundled service definition lives flat under proto/, imports are resolved from there.
    let proto_dir = PathBuf::from("proto");
    println!("cargo:rerun-if-changed={}", proto_dir.display());

    // Deterministic order so the descriptor set is stable between builds.
    let mut protos: Vec<PathBuf> = WalkDir::new(&proto_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "proto"))
        .collect();
    protos.sort();

    if protos.is_empty() {
        return Err(format!("no .proto files found under {}", proto_dir.display()).into());
    }
    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // A protoc on PATH or in $PROTOC wins over the vendored binary.
    println!("cargo:rerun-if-env-changed=PROTOC");
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let mut config = prost_build::Config::new();
    config.file_descriptor_set_path(out_dir.join("lnd_descriptor.bin"));
    // One attribute per line, so the oneof pass below can find the fields.
    config.format(false);
    let fds = config.load_fds(&protos, &[&proto_dir])?;

    let mapping = JsonMapping::from_descriptors(&fds)?;
    fs::write(out_dir.join("json_enums.rs"), mapping.enum_modules())?;

    let mut builder = tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .out_dir(&out_dir)
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .message_attribute(".", "#[serde(default)]");
    for (path, attribute) in &mapping.field_attributes {
        builder = builder.field_attribute(path, attribute);
    }

    let mut packages: Vec<String> = fds.file.iter().map(|f| f.package().to_string()).collect();
    packages.sort();
    packages.dedup();

    builder.compile_fds_with_config(config, fds)?;

    for package in &packages {
        flatten_oneofs(&out_dir.join(format!("{package}.rs")))?;
    }

    Ok(())
}

/// serde attributes that give the generated messages their proto3 JSON shape. The codecs they
/// name live in `src/json.rs`.
#[derive(Default)]
struct JsonMapping {
    /// `(proto path, attribute)` pairs for `field_attribute`.
    field_attributes: Vec<(String, String)>,
    /// Codec module name to `(fully qualified enum, values)`.
    enums: BTreeMap<String, (String, Vec<(i32, String)>)>,
    /// Fully qualified map entry message to its value field.
    map_entries: HashMap<String, FieldDescriptorProto>,
}

impl JsonMapping {
    fn from_descriptors(fds: &FileDescriptorSet) -> Result<Self, String> {
        let mut mapping = JsonMapping::default();

        for file in &fds.file {
            let scope = format!(".{}", file.package());
            for enumeration in &file.enum_type {
                mapping.add_enum(&scope, enumeration)?;
            }
            for message in &file.message_type {
                mapping.index_message(&scope, message)?;
            }
        }

        for file in &fds.file {
            let scope = format!(".{}", file.package());
            for message in &file.message_type {
                mapping.add_message(&scope, message);
            }
        }

        Ok(mapping)
    }

    fn add_enum(&mut self, scope: &str, enumeration: &EnumDescriptorProto) -> Result<(), String> {
        let fq_name = format!("{scope}.{}", enumeration.name());
        let values: Vec<(i32, String)> = enumeration
            .value
            .iter()
            .map(|value| (value.number(), value.name().to_string()))
            .collect();

        for (_, name) in &values {
            self.field_attributes
                .push((format!("{fq_name}.{name}"), format!("#[serde(rename = \"{name}\")]")));
        }

        let module = enum_module(&fq_name);
        if let Some((other, _)) = self.enums.insert(module.clone(), (fq_name.clone(), values)) {
            return Err(format!("{fq_name} and {other} both map to json::enums::{module}"));
        }
        Ok(())
    }

    /// Records nested enums and map entries ahead of the field pass.
    fn index_message(&mut self, scope: &str, message: &DescriptorProto) -> Result<(), String> {
        let fq_name = format!("{scope}.{}", message.name());

        if message.options.as_ref().is_some_and(|o| o.map_entry()) {
            if let Some(value) = message.field.iter().find(|f| f.number() == 2) {
                self.map_entries.insert(fq_name, value.clone());
            }
            return Ok(());
        }

        for enumeration in &message.enum_type {
            self.add_enum(&fq_name, enumeration)?;
        }
        for nested in &message.nested_type {
            self.index_message(&fq_name, nested)?;
        }
        Ok(())
    }

    fn add_message(&mut self, scope: &str, message: &DescriptorProto) {
        let fq_name = format!("{scope}.{}", message.name());
        if self.map_entries.contains_key(&fq_name) {
            return;
        }

        for field in &message.field {
            // proto3 `optional` lives in a synthetic oneof but prost renders it as a plain Option.
            let oneof = field
                .oneof_index
                .filter(|_| !field.proto3_optional())
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| message.oneof_decl.get(index));
            let path = match oneof {
                Some(oneof) => format!("{fq_name}.{}.{}", oneof.name(), field.name()),
                None => format!("{fq_name}.{}", field.name()),
            };
            let attribute = self.field_attribute(field, oneof.is_some());
            self.field_attributes.push((path, attribute));
        }

        for nested in &message.nested_type {
            self.add_message(&fq_name, nested);
        }
    }

    fn field_attribute(&self, field: &FieldDescriptorProto, in_oneof: bool) -> String {
        let name = field.name();
        let mut parts = vec![format!("rename = \"{name}\"")];

        let json_name = field
            .json_name
            .clone()
            .unwrap_or_else(|| lower_camel(name));
        if json_name != name {
            parts.push(format!("alias = \"{json_name}\""));
        }

        let map_value = if field.r#type() == Type::Message {
            self.map_entries.get(field.type_name())
        } else {
            None
        };

        let codec = match map_value {
            Some(value) => self.codec(value).map(|codec| format!("{codec}::map_values")),
            None if field.label() == Label::Repeated => {
                self.codec(field).map(|codec| format!("{codec}::repeated"))
            }
            None if field.proto3_optional() && !in_oneof => {
                let codec = self.codec(field).map(|codec| format!("{codec}::option"));
                parts.push("skip_serializing_if = \"Option::is_none\"".to_string());
                codec
            }
            None => self.codec(field),
        };
        if let Some(codec) = codec {
            parts.push(format!("with = \"{codec}\""));
        }

        format!("#[serde({})]", parts.join(", "))
    }

    /// Codec module for the scalar type of `field`, `None` where serde's default already matches.
    fn codec(&self, field: &FieldDescriptorProto) -> Option<String> {
        match field.r#type() {
            Type::Int64 | Type::Uint64 | Type::Sint64 | Type::Fixed64 | Type::Sfixed64 => {
                Some("crate::json::int64".to_string())
            }
            Type::Bytes => Some("crate::json::bytes".to_string()),
            Type::Enum => Some(format!("crate::json::enums::{}", enum_module(field.type_name()))),
            _ => None,
        }
    }

    fn enum_modules(&self) -> String {
        let mut out = String::from("// Generated by build.rs from the bundled descriptors.\n\n");
        for (module, (fq_name, values)) in &self.enums {
            let table: Vec<String> = values
                .iter()
                .map(|(number, name)| format!("({number}, \"{name}\")"))
                .collect();
            out.push_str(&format!("// {fq_name}\nproto_enum!({module}, [{}]);\n", table.join(", ")));
        }
        out
    }
}

/// `.lnrpc.Payment.PaymentStatus` becomes `lnrpc_payment_payment_status`.
fn enum_module(fq_name: &str) -> String {
    fq_name
        .trim_start_matches('.')
        .split('.')
        .map(snake_case)
        .collect::<Vec<_>>()
        .join("_")
}

fn snake_case(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// protoc's default JSON name: underscores dropped, the following letter upper-cased.
fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Oneof members serialize as fields of the parent message, so the Option<enum> field prost
/// generates for each oneof is flattened. prost-build applies a field attribute to every path it
/// prefixes, which would also tag the variants, hence the textual pass.
fn flatten_oneofs(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let source = fs::read_to_string(path)?;
    let mut out = String::with_capacity(source.len() + 1024);
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[prost(oneof") {
            out.push_str(&line[..line.len() - trimmed.len()]);
            out.push_str("#[serde(flatten)]\n");
        }
        out.push_str(line);
    }
    fs::write(path, out)
}
