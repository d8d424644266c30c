/// 时间采样器：从帧区间中均匀挑选固定数量的帧号
///
/// 采样是三个整数参数的纯函数，不含随机性，相同参数总是得到相同帧号，
/// 保证预测结果可复现。
#[derive(Debug, Clone, Copy)]
pub struct TemporalSampler {
    target_count: usize,
}

impl TemporalSampler {
    pub fn new(target_count: usize) -> Self {
        Self { target_count }
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// 在 `[range_start, range_end)` 中挑选帧号
    ///
    /// - 区间为空：返回空列表，由下游按"没有帧"处理
    /// - 区间帧数不超过目标数：返回区间内全部帧号
    /// - 否则：在 `[range_start, range_end - 1]` 上线性等距取 `target_count` 个点，四舍五入取整
    pub fn sample(&self, range_start: usize, range_end: usize) -> Vec<usize> {
        if range_end <= range_start || self.target_count == 0 {
            return Vec::new();
        }

        let frames_in_range = range_end - range_start;
        if frames_in_range <= self.target_count {
            return (range_start..range_end).collect();
        }

        if self.target_count == 1 {
            return vec![range_start];
        }

        let last = (range_end - 1) as f64;
        let first = range_start as f64;
        let step = (last - first) / (self.target_count - 1) as f64;

        (0..self.target_count)
            .map(|i| (first + i as f64 * step).round() as usize)
            .collect()
    }
}
