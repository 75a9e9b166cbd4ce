use serde_json::{Map, Value};

/// ネストしたJSONをアンダースコア連結キーの1階層マップに畳み込む
///
/// オブジェクトのみ再帰する。配列はそれ以上分解せず、1つの葉として
/// そのまま保持する（後段でJSONテキストに落とすため）。
pub fn flatten(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(value, "", &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}_{}", prefix, key)
                };
                flatten_into(child, &path, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}
