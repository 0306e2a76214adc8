//! 重要文件夹识别

/// 按关键字判断文件夹名是否“重要”
#[derive(Debug, Clone)]
pub struct FolderClassifier {
    keywords: Vec<String>,
}

impl FolderClassifier {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// 不区分大小写的子串匹配，"My_Important_Docs" 也算
    pub fn is_important(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}
