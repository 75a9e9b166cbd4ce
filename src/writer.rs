use crate::error::Result;
use crate::flatten::flatten;
use crate::schema::{Table, TableSchema};
use serde_json::{Map, Value, json};
use std::fs::File;
use std::path::{Path, PathBuf};

/// フラッシュ前に溜める最大行数（高カーディナリティのリソースでの
/// ピークメモリを抑える）
const BATCH_SIZE: usize = 1000;

/// 1テーブル分のCSVライター
///
/// 生成時にサイドカーのマニフェスト（スキーマとロード方式）を書き出し、
/// 行はフラット化 → スキーマ射影 → セル文字列化の順で通す。
/// ヘッダー行は書かない（カラム名はマニフェスト側が持つ）。
pub struct TableWriter {
    schema: &'static TableSchema,
    writer: csv::Writer<File>,
    buffer: Vec<Map<String, Value>>,
    table_path: PathBuf,
}

impl TableWriter {
    pub fn create<P: AsRef<Path>>(out_dir: P, table: Table, incremental: bool) -> Result<Self> {
        Self::create_as(out_dir, table, incremental, table.name())
    }

    /// カスタムJQLなど、既定スキーマを別名テーブルで使う場合
    pub fn create_as<P: AsRef<Path>>(
        out_dir: P,
        table: Table,
        incremental: bool,
        name: &str,
    ) -> Result<Self> {
        let schema = table.schema();
        let table_path = out_dir.as_ref().join(format!("{}.csv", name));

        let manifest = json!({
            "incremental": incremental,
            "primary_key": schema.primary_key,
            "columns": schema.renamed,
        });
        let manifest_path = out_dir.as_ref().join(format!("{}.csv.manifest", name));
        std::fs::write(&manifest_path, serde_json::to_string(&manifest)?)?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_path(&table_path)?;

        Ok(Self {
            schema,
            writer,
            buffer: Vec::new(),
            table_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.table_path
    }

    /// 生のAPIアイテム列を書き込む（フラット化と射影はここで行う）
    pub fn write_values(&mut self, items: &[Value]) -> Result<()> {
        for item in items {
            let flat = flatten(item);
            self.write_row(&flat, None)?;
        }
        Ok(())
    }

    /// 整形済みの行を書き込む
    ///
    /// issue系リソースはカスタムフィールドバッグを添えて呼ぶ。
    pub fn write_row(
        &mut self,
        row: &Map<String, Value>,
        custom_fields: Option<&Map<String, Value>>,
    ) -> Result<()> {
        let flat = flatten(&Value::Object(row.clone()));
        let projected = self.schema.project(&flat, custom_fields)?;
        self.buffer.push(projected);

        if self.buffer.len() >= BATCH_SIZE {
            self.flush_buffer()?;
        }

        Ok(())
    }

    /// バッファ済みの行をファイルへ吐き出す
    fn flush_buffer(&mut self) -> Result<()> {
        for row in self.buffer.drain(..) {
            let record: Vec<String> = self
                .schema
                .fields
                .iter()
                .map(|field| row.get(*field).map(render_cell).unwrap_or_default())
                .collect();
            self.writer.write_record(&record)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush_buffer()
    }
}

/// JSON値をCSVのセル表現へ落とす
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // 配列とオブジェクトはコンパクトなJSON表現で残す
        other => other.to_string(),
    }
}
